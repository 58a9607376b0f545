use log::{debug, warn};
use super::parser::{read_length, read_lstring, Decoded};

/// Re-walks a raw response to pull out the column names and row values
/// that end up in the CSV dump of the published record.
pub fn parse_response(data: &[u8], max_rows: usize, max_row_length: usize) -> (Vec<String>, Vec<Vec<String>>) {
    let mut fields = Vec::new();
    let mut rows   = Vec::new();

    if data.len() < 5 {
        warn!("skipping empty mysql response");
        return (fields, rows);
    }

    if data[4] == 0x00 || data[4] == 0xff {
        // OK and error responses carry no result set
        return (fields, rows);
    }

    let mut offset = 5;

    // field definitions up to the EOF marker
    loop {
        let length = match read_length(data, offset) {
            Some(length) => length,
            None         => return (fields, rows),
        };
        match data.get(offset + 4) {
            Some(0xfe) => {
                offset += length + 4;
                break;
            }
            Some(_) => (),
            None    => return (fields, rows),
        }

        // catalog, db, table, org table, name, org name
        let mut off  = offset + 4;
        let mut name = None;
        for i in 0..6 {
            match lstr(data, off) {
                Some((v, o)) => {
                    if i == 4 {
                        name = Some(v);
                    }
                    off = o;
                }
                None => {
                    debug!("truncated mysql field definition");
                    return (fields, rows);
                }
            }
        }
        if let Some(name) = name {
            fields.push(String::from_utf8_lossy(name).into_owned());
        }

        offset += length + 4;
    }

    // rows up to the EOF marker
    while offset < data.len() {
        match data.get(offset + 4) {
            Some(0xfe) | None => break,
            Some(_)           => (),
        }
        let length = match read_length(data, offset) {
            Some(length) => length,
            None         => break,
        };

        let start   = offset + 4;
        let mut off = start;
        let mut row = Vec::new();
        let mut len = 0;

        while off < start + length && off < data.len() {
            let text = match data[off] {
                0xfb => {
                    off += 1;
                    b"NULL".to_vec()
                }
                _ => match lstr(data, off) {
                    Some((v, o)) => {
                        off = o;
                        v.to_vec()
                    }
                    None => return (fields, rows),
                },
            };

            if len < max_row_length {
                let text = &text[..text.len().min(max_row_length - len)];
                len += text.len();
                row.push(String::from_utf8_lossy(text).into_owned());
            }
        }

        rows.push(row);
        if rows.len() >= max_rows {
            break;
        }

        offset += length + 4;
    }

    (fields, rows)
}

pub fn dump_csv(fields: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    if !fields.is_empty() {
        out.push_str(&fields.join(", "));
        out.push('\n');
    }
    for row in rows {
        out.push_str(&row.join(", "));
        out.push('\n');
    }
    out
}

fn lstr(data: &[u8], offset: usize) -> Option<(&[u8], usize)> {
    match read_lstring(data, offset) {
        Decoded::Complete(v, off) => Some((v, off)),
        _                         => None,
    }
}
