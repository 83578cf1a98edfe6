/// Header-checked TSV parsing.
///
/// The first non-empty line must equal the expected headers exactly (case
/// and order). Data cells are trimmed; case is preserved here — key columns
/// are case-folded exactly once by the pipeline when it builds entities.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TsvParseError {
    #[error("file is empty")]
    EmptyFile,
    #[error("file is not valid UTF-8")]
    Encoding,
    #[error("header mismatch: expected `{expected}`, found `{found}`")]
    HeaderMismatch { expected: String, found: String },
    #[error("file exceeds the limit of {limit} data rows")]
    FileTooLarge { limit: usize },
}

/// One data row. `line_number` counts physical lines with the header as
/// line 1, so the first data row is 2; it is what error reports cite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsvRow {
    pub line_number: usize,
    /// Trimmed cells, padded with empty strings up to the header count.
    pub cells: Vec<String>,
    /// The original line, preserved verbatim for error artifacts.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTsv {
    pub headers: Vec<String>,
    pub rows: Vec<TsvRow>,
}

impl ParsedTsv {
    /// Cell of `row` under `header`; empty string for unknown headers.
    #[must_use]
    pub fn field<'a>(&self, row: &'a TsvRow, header: &str) -> &'a str {
        self.headers
            .iter()
            .position(|h| h == header)
            .map_or("", |idx| row.cells[idx].as_str())
    }
}

pub fn parse(
    bytes: &[u8],
    expected_headers: &[&str],
    row_limit: usize,
) -> Result<ParsedTsv, TsvParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| TsvParseError::Encoding)?;

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')));

    let Some((_, header_line)) = lines.find(|(_, line)| !line.trim().is_empty()) else {
        return Err(TsvParseError::EmptyFile);
    };

    let found: Vec<&str> = header_line.split('\t').map(str::trim).collect();
    if found != expected_headers {
        return Err(TsvParseError::HeaderMismatch {
            expected: expected_headers.join("\t"),
            found: found.join("\t"),
        });
    }

    let mut rows = Vec::new();
    for (line_number, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        if rows.len() >= row_limit {
            return Err(TsvParseError::FileTooLarge { limit: row_limit });
        }
        let mut cells: Vec<String> = line.split('\t').map(|c| c.trim().to_string()).collect();
        // Short rows are kept; the empty cells fail field validation later.
        cells.resize(expected_headers.len(), String::new());
        cells.truncate(expected_headers.len());
        rows.push(TsvRow {
            line_number,
            cells,
            raw: line.to_string(),
        });
    }

    if rows.is_empty() {
        return Err(TsvParseError::EmptyFile);
    }

    Ok(ParsedTsv {
        headers: expected_headers.iter().map(ToString::to_string).collect(),
        rows,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const HEADERS: &[&str] = &["style", "brand", "category"];

    #[test]
    fn test_parses_rows_with_line_numbers() {
        let parsed = parse(b"style\tbrand\tcategory\nSTY1\tAcme\tShirts\nSTY2\tAcme\tPants\n", HEADERS, 100)
            .unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].line_number, 2);
        assert_eq!(parsed.rows[1].line_number, 3);
        assert_eq!(parsed.field(&parsed.rows[1], "category"), "Pants");
    }

    #[test]
    fn test_cells_are_trimmed_but_case_preserved() {
        let parsed = parse(b"style\tbrand\tcategory\n sty1 \t AcMe\tShirts \n", HEADERS, 100).unwrap();
        assert_eq!(parsed.rows[0].cells, vec!["sty1", "AcMe", "Shirts"]);
    }

    #[test]
    fn test_header_mismatch() {
        let err = parse(b"style\tbrand\nSTY1\tAcme\n", HEADERS, 100).unwrap_err();
        assert_eq!(
            err,
            TsvParseError::HeaderMismatch {
                expected: "style\tbrand\tcategory".into(),
                found: "style\tbrand".into(),
            }
        );
    }

    #[test]
    fn test_header_is_case_sensitive() {
        let err = parse(b"Style\tbrand\tcategory\nSTY1\tAcme\tShirts\n", HEADERS, 100).unwrap_err();
        assert!(matches!(err, TsvParseError::HeaderMismatch { .. }));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let parsed = parse(b"style\tbrand\tcategory\nSTY1\tAcme\n", HEADERS, 100).unwrap();
        assert_eq!(parsed.rows[0].cells, vec!["STY1", "Acme", ""]);
        assert_eq!(parsed.rows[0].raw, "STY1\tAcme");
    }

    #[test]
    fn test_empty_file_variants() {
        assert_eq!(parse(b"", HEADERS, 100).unwrap_err(), TsvParseError::EmptyFile);
        assert_eq!(parse(b"\n\n", HEADERS, 100).unwrap_err(), TsvParseError::EmptyFile);
        // Header only, no data rows.
        assert_eq!(
            parse(b"style\tbrand\tcategory\n", HEADERS, 100).unwrap_err(),
            TsvParseError::EmptyFile
        );
    }

    #[test]
    fn test_row_limit() {
        let err = parse(
            b"style\tbrand\tcategory\na\tb\tc\nd\te\tf\n",
            HEADERS,
            1,
        )
        .unwrap_err();
        assert_eq!(err, TsvParseError::FileTooLarge { limit: 1 });
    }

    #[test]
    fn test_crlf_line_endings() {
        let parsed = parse(b"style\tbrand\tcategory\r\nSTY1\tAcme\tShirts\r\n", HEADERS, 100).unwrap();
        assert_eq!(parsed.rows[0].cells, vec!["STY1", "Acme", "Shirts"]);
    }
}
