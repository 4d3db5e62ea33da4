use schema::Record;

/// A line that produced a record, plus the attribute fragments that were
/// dropped along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub record: Record,
    pub skipped_fragments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRejected {
    Blank,
    MissingRowKey(String),
}

/// Parse `<last> <first> [key=value]...`.
///
/// Fields are whitespace-delimited; fewer than two rejects the line.
/// Fragments split on the first `=` only, so `a=b=c` yields `a` -> `b=c`.
/// Fragments with no `=` or an empty key are skipped on their own.
pub fn parse_line(line: &str) -> Result<ParsedLine, LineRejected> {
    let mut fields = line.split_whitespace();
    let Some(partition_key) = fields.next() else {
        return Err(LineRejected::Blank);
    };
    let Some(row_key) = fields.next() else {
        return Err(LineRejected::MissingRowKey(partition_key.to_string()));
    };

    let mut record = Record::new(partition_key, row_key);
    let mut skipped_fragments = Vec::new();
    for fragment in fields {
        match fragment.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                record.attributes.insert(key.to_string(), value.to_string());
            }
            _ => skipped_fragments.push(fragment.to_string()),
        }
    }

    Ok(ParsedLine {
        record,
        skipped_fragments,
    })
}
