//! Bulk import: best-effort parsing of "name<delim>credential" lines.
//!
//! The delimiter is sniffed per line: `:` first, then `,`, then `;`,
//! falling back to tab. Anything that doesn't look like a record is
//! skipped, never an error.

/// Credentials shorter than this are treated as junk.
pub const MIN_CREDENTIAL_LEN: usize = 10;

/// A record parsed from import text, before it gets an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedRecord {
    /// Empty when the line had no name; the store fills in a default.
    pub name: String,
    pub credential: String,
}

pub fn parse_records(text: &str) -> Vec<ImportedRecord> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<ImportedRecord> {
    if line.trim().is_empty() {
        return None;
    }

    let delimiter = [':', ',', ';']
        .into_iter()
        .find(|d| line.contains(*d))
        .unwrap_or('\t');
    let parts: Vec<&str> = line.split(delimiter).collect();
    if parts.len() < 2 {
        return None;
    }

    let name = parts[0].trim();
    let credential = parts[1..].concat().trim().to_string();

    if is_header(name, &credential) {
        return None;
    }
    if credential.chars().count() < MIN_CREDENTIAL_LEN {
        return None;
    }

    Some(ImportedRecord {
        name: name.to_string(),
        credential,
    })
}

fn is_header(name: &str, credential: &str) -> bool {
    name.to_lowercase().contains("name") && credential.to_lowercase().contains("key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_short_credentials_skipped() {
        let records = parse_records("Name:Key\nAlpha:abcdefghijklmno\nBeta,short\n");
        assert_eq!(
            records,
            vec![ImportedRecord {
                name: "Alpha".into(),
                credential: "abcdefghijklmno".into(),
            }]
        );
    }

    #[test]
    fn test_delimiter_priority() {
        let records = parse_records(
            "one,AIzaSyAAAAAAAAAA\n\
             two;AIzaSyBBBBBBBBBB\n\
             three\tAIzaSyCCCCCCCCCC\n\
             four:AIza,SyDDDDDDDDDD\n",
        );
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "three", "four"]);
        // Colon wins over comma, so the comma stays inside the credential.
        assert_eq!(records[3].credential, "AIza,SyDDDDDDDDDD");
    }

    #[test]
    fn test_extra_fields_are_joined() {
        let records = parse_records("prod : AIzaSy:0123456789\r\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "prod");
        assert_eq!(records[0].credential, "AIzaSy0123456789");
    }

    #[test]
    fn test_blank_and_malformed_lines_skipped() {
        let records = parse_records("\n   \njust-one-field-without-delimiter\n:AIzaSyEEEEEEEEEE\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "");
    }

    #[test]
    fn test_header_detection_is_case_insensitive() {
        assert!(parse_records("Project NAME, API KEY column header\n").is_empty());
        // Only one side matching is not a header.
        assert_eq!(parse_records("rename-me:AIzaSyFFFFFFFFFF\n").len(), 1);
    }
}
