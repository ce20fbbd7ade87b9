/// A delimited file exactly as read: every cell is still a string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names from the header line, untouched.
    pub headers: Vec<String>,
    /// Each data line, as a Vec of Strings (one per field).
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
