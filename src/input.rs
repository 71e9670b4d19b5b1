use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::errors::ScreenError;

pub const DEFAULT_ADDRESS_COLUMN: &str = "address";

/// Removes duplicates, keeping the first occurrence of each address in its
/// original position.
pub fn dedup_addresses<I>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|address| seen.insert(address.clone()))
        .collect()
}

/// Reads the unique, non-blank addresses of `column` from a CSV file.
pub fn read_addresses(path: &Path, column: &str) -> Result<Vec<String>, ScreenError> {
    if !path.exists() {
        return Err(ScreenError::Input(format!(
            "CSV file not found: {}",
            path.display()
        )));
    }
    let file = std::fs::File::open(path).map_err(|e| {
        ScreenError::Input(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let addresses = read_addresses_from_reader(file, column)?;
    tracing::info!(
        "Read {} unique addresses from {}",
        addresses.len(),
        path.display()
    );
    Ok(addresses)
}

/// Reads addresses from CSV data with a header row.
///
/// Values are trimmed and blank cells skipped. Fails if `column` is not in
/// the header.
pub fn read_addresses_from_reader<R: Read>(
    reader: R,
    column: &str,
) -> Result<Vec<String>, ScreenError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let index = headers.iter().position(|h| h == column).ok_or_else(|| {
        ScreenError::Input(format!(
            "Column '{}' not found in CSV. Available columns: {:?}",
            column,
            headers.iter().collect::<Vec<_>>()
        ))
    })?;

    let mut addresses = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if let Some(value) = record.get(index) {
            if !value.is_empty() {
                addresses.push(value.to_string());
            }
        }
    }

    Ok(dedup_addresses(addresses))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let input = vec!["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        assert_eq!(dedup_addresses(input), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_reads_named_column() {
        let data = "id,address,note\n1,0xabc,first\n2, 0xdef ,second\n3,,blank\n4,0xabc,dup\n";
        let addresses = read_addresses_from_reader(data.as_bytes(), "address").unwrap();
        assert_eq!(addresses, vec!["0xabc", "0xdef"]);
    }

    #[test]
    fn test_missing_column_lists_available() {
        let data = "wallet,chain\n0xabc,eth\n";
        let err = read_addresses_from_reader(data.as_bytes(), "address").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Column 'address' not found"));
        assert!(message.contains("wallet"));
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let data = "id,address\n1\n2,0xabc\n";
        let addresses = read_addresses_from_reader(data.as_bytes(), "address").unwrap();
        assert_eq!(addresses, vec!["0xabc"]);
    }

    #[test]
    fn test_missing_file() {
        let err = read_addresses(Path::new("/nonexistent/addresses.csv"), "address").unwrap_err();
        assert!(matches!(err, ScreenError::Input(_)));
    }
}
