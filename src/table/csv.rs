//! Minimal RFC 4180 reader/writer for the result files.

/// Why a CSV body could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvFault {
    UnterminatedQuote { line: usize },
    StrayQuote { line: usize },
}

impl std::fmt::Display for CsvFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsvFault::UnterminatedQuote { line } => {
                write!(f, "quoted field opened on line {} never closes", line)
            }
            CsvFault::StrayQuote { line } => write!(f, "stray quote on line {}", line),
        }
    }
}

/// Quote a field when it contains a delimiter, quote, or line break.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Serialize records, one per line, `\n` terminated.
pub fn write_records<R, F>(records: R) -> String
where
    R: IntoIterator<Item = F>,
    F: IntoIterator,
    F::Item: AsRef<str>,
{
    let mut out = String::new();
    for record in records {
        let line: Vec<String> = record
            .into_iter()
            .map(|field| escape_field(field.as_ref()))
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Split a CSV body into records. Blank lines are skipped; `\r\n` and `\n`
/// both end a record outside quotes.
pub fn parse_records(body: &str) -> Result<Vec<Vec<String>>, CsvFault> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Set after a closing quote; only a delimiter or line end may follow.
    let mut after_quote = false;
    let mut field_started = false;
    let mut line = 1;
    let mut quote_line = 1;

    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    after_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
                quote_line = line;
            }
            '"' => return Err(CsvFault::StrayQuote { line }),
            ',' => {
                record.push(std::mem::take(&mut field));
                after_quote = false;
                field_started = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                finish_record(&mut records, &mut record, &mut field, field_started);
                after_quote = false;
                field_started = false;
                line += 1;
            }
            _ if after_quote => return Err(CsvFault::StrayQuote { line }),
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(CsvFault::UnterminatedQuote { line: quote_line });
    }
    finish_record(&mut records, &mut record, &mut field, field_started);
    Ok(records)
}

fn finish_record(
    records: &mut Vec<Vec<String>>,
    record: &mut Vec<String>,
    field: &mut String,
    field_started: bool,
) {
    if record.is_empty() && !field_started && field.is_empty() {
        return;
    }
    record.push(std::mem::take(field));
    records.push(std::mem::take(record));
}
