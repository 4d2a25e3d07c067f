use crate::cli::{CacheArgs, CacheClearArgs, CacheCommand};
use crate::commands::{base_options, open_reader};
use crate::exit_codes;

pub fn execute(args: CacheArgs) -> i32 {
    match args.command {
        CacheCommand::Clear(args) => clear(args),
    }
}

fn clear(args: CacheClearArgs) -> i32 {
    let result = open_reader(&args.dataset, base_options(&args.dataset))
        .and_then(|reader| Ok((reader.cache().clear(args.kind)?, reader)));
    match result {
        Ok((removed, reader)) => {
            println!(
                "Removed {} cached {} files from {}",
                removed,
                args.kind.dir_name(),
                reader.cache().root().display()
            );
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::for_error(&e)
        }
    }
}
