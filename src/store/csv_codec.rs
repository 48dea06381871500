//! Minimal RFC 4180 reading and writing for the annotation log.

use std::borrow::Cow;

/// A parsed record with the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Record {
    pub(super) line: usize,
    pub(super) fields: Vec<String>,
}

pub(super) fn encode_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Encodes one record terminated by `\n`.
pub(super) fn encode_record<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let encoded: Vec<Cow<'_, str>> = fields.into_iter().map(encode_field).collect();
    let mut line = encoded.join(",");
    line.push('\n');
    line
}

/// Splits text into records. Blank lines outside quotes are skipped.
pub(super) fn parse_records(text: &str) -> Result<Vec<Record>, (usize, String)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut line = 1;
    let mut record_line = 1;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() && !field_started => {
                in_quotes = true;
                field_started = true;
            }
            '"' => return Err((line, "unexpected quote inside unquoted field".to_string())),
            ',' => {
                fields.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if !fields.is_empty() || !field.is_empty() || field_started {
                    fields.push(std::mem::take(&mut field));
                    records.push(Record {
                        line: record_line,
                        fields: std::mem::take(&mut fields),
                    });
                }
                field_started = false;
                line += 1;
                record_line = line;
            }
            _ => {
                field.push(ch);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err((record_line, "unterminated quoted field".to_string()));
    }
    if !fields.is_empty() || !field.is_empty() || field_started {
        fields.push(field);
        records.push(Record {
            line: record_line,
            fields,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_field_quotes_only_when_needed() {
        assert_eq!(encode_field("plain text"), "plain text");
        assert_eq!(encode_field("a, b"), "\"a, b\"");
        assert_eq!(encode_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(encode_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn parse_records_handles_quotes_newlines_and_crlf() {
        let text = "a,b,c\r\n1,\"x, \"\"y\"\"\",\"multi\nline\"\r\n\n2,,last\n";
        let records = parse_records(text).expect("parses");

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].fields, vec!["a", "b", "c"]);
        assert_eq!(records[1].line, 2);
        assert_eq!(records[1].fields, vec!["1", "x, \"y\"", "multi\nline"]);
        assert_eq!(records[2].line, 5);
        assert_eq!(records[2].fields, vec!["2", "", "last"]);
    }

    #[test]
    fn parse_records_reads_encoded_record_back() {
        let fields = ["s-1", "rater, one", "4", "because \"data\"\nshows it", ""];
        let encoded = encode_record(fields);
        let records = parse_records(&encoded).expect("parses");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields, fields.to_vec());
    }

    #[test]
    fn parse_records_rejects_unterminated_quote() {
        let err = parse_records("a,b\n1,\"open\n").expect_err("must fail");
        assert_eq!(err.0, 2);
    }
}
