use crate::cli::ListArgs;
use crate::commands::{base_options, open_reader};
use crate::exit_codes;
use crate::output;

pub fn execute(args: ListArgs) -> i32 {
    let ids = match open_reader(&args.dataset, base_options(&args.dataset))
        .and_then(|reader| reader.record_ids())
    {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if args.json {
        match output::to_json(&ids, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        for id in &ids {
            println!("{}", id);
        }
    }

    exit_codes::SUCCESS
}
