use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Float,
    Uri,
    UriCollection,
    Stdout,
    Stderr,
}

impl DataType {
    /// Inputs and outputs of these types are files that need staging
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Uri | Self::UriCollection | Self::Stdout | Self::Stderr)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDataObject {
    pub name: String,
    pub value: Option<String>,
    pub data_type: DataType,
    pub application_argument: Option<String>,
    pub is_required: bool,
    pub input_order: u32,
}

impl InputDataObject {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            data_type: DataType::String,
            application_argument: None,
            is_required: false,
            input_order: 0,
        }
    }

    pub fn uri(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            data_type: DataType::Uri,
            ..Self::string(name, value)
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Individual values; URI collections are comma separated
    pub fn values(&self) -> Vec<&str> {
        match (&self.value, self.data_type) {
            (Some(value), DataType::UriCollection) => value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .collect(),
            (Some(value), _) if !value.trim().is_empty() => vec![value.trim()],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDataObject {
    pub name: String,
    /// File name relative to the working directory, or the value once known
    pub value: Option<String>,
    pub data_type: DataType,
    pub is_required: bool,
}

impl OutputDataObject {
    pub fn uri(name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(file_name.into()),
            data_type: DataType::Uri,
            is_required: false,
        }
    }
}
