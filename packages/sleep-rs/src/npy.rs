// NumPy .npy (format version 1.0) encoding for one-dimensional numeric arrays
// Specification: https://numpy.org/doc/stable/reference/generated/numpy.lib.format.html

use crate::error::{Result, SleepError};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Encode values as a little-endian float64 array
pub fn encode_f64(values: &[f64]) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );
    // Header (magic + version + length + dict + newline) is padded to a multiple of 64
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(unpadded + padding + values.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header.find(&format!("'{}':", key))? + key.len() + 3;
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else {
        rest.find(',').unwrap_or(rest.len())
    };
    Some(rest[..end].trim())
}

/// Decode a one-dimensional `<f8`, `<f4`, `<i8` or `<i4` array into f64 values
pub fn decode(bytes: &[u8]) -> Result<Vec<f64>> {
    let err = |msg: &str| SleepError::ParseError(format!("npy array: {}", msg));

    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(err("missing magic string"));
    }
    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        v => return Err(err(&format!("unsupported format version {}", v))),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .map(String::from_utf8_lossy)
        .ok_or_else(|| err("truncated header"))?;

    if header_value(&header, "fortran_order") == Some("True") {
        return Err(err("fortran order is not supported"));
    }
    let descr = header_value(&header, "descr")
        .map(|d| d.trim_matches('\'').to_string())
        .ok_or_else(|| err("missing descr"))?;
    let shape = header_value(&header, "shape").ok_or_else(|| err("missing shape"))?;
    let dims: Vec<usize> = shape
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| err("bad shape")))
        .collect::<Result<_>>()?;
    if dims.len() != 1 {
        return Err(err(&format!("expected a 1-d array, got shape {}", shape)));
    }
    let count = dims[0];

    let data = &bytes[data_start..];
    let (width, convert): (usize, fn(&[u8]) -> f64) = match descr.as_str() {
        "<f8" => (8, |b| f64::from_le_bytes(b.try_into().unwrap_or([0; 8]))),
        "<f4" => (4, |b| f32::from_le_bytes(b.try_into().unwrap_or([0; 4])) as f64),
        "<i8" => (8, |b| i64::from_le_bytes(b.try_into().unwrap_or([0; 8])) as f64),
        "<i4" => (4, |b| i32::from_le_bytes(b.try_into().unwrap_or([0; 4])) as f64),
        other => return Err(err(&format!("unsupported dtype {}", other))),
    };
    let byte_len = count
        .checked_mul(width)
        .ok_or_else(|| err(&format!("shape {} is too large", shape)))?;
    if data.len() < byte_len {
        return Err(err("truncated data"));
    }

    Ok(data[..byte_len].chunks_exact(width).map(convert).collect())
}
