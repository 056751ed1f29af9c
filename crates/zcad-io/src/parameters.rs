//! 读写器参数
//!
//! 参数以 JSON 对象保存，读写器按键取出自己关心的值：
//!
//! ```json
//! {
//!   "STEP": { "product_name_mode": "name_and_description" },
//!   "STL":  { "merge_facets": true }
//! }
//! ```

use crate::error::IoError;
use crate::format::Format;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// 一组读写器参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置参数
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 取出并反序列化为 `T`，缺失或类型不符时返回 `None`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// 按格式提供读取器参数
pub trait ParametersProvider {
    fn find_reader_parameters(&self, format: Format) -> Option<Parameters>;
}

/// 按格式索引的参数表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParametersMap {
    readers: HashMap<Format, Parameters>,
}

impl ParametersMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, format: Format, parameters: Parameters) {
        self.readers.insert(format, parameters);
    }

    pub fn from_json_str(json: &str) -> Result<Self, IoError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, IoError> {
        let json = std::fs::read_to_string(path)?;
        let map = Self::from_json_str(&json)?;
        tracing::debug!(
            "Loaded reader parameters for {} formats from {}",
            map.readers.len(),
            path.display()
        );
        Ok(map)
    }
}

impl ParametersProvider for ParametersMap {
    fn find_reader_parameters(&self, format: Format) -> Option<Parameters> {
        self.readers.get(&format).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let params = Parameters::new()
            .with("merge_facets", true)
            .with("tolerance", 0.01)
            .with("name", "part");

        assert_eq!(params.get::<bool>("merge_facets"), Some(true));
        assert_eq!(params.get::<f64>("tolerance"), Some(0.01));
        assert_eq!(params.get::<String>("name").as_deref(), Some("part"));
        assert_eq!(params.get::<bool>("name"), None);
        assert_eq!(params.get::<u32>("missing"), None);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_map_from_json() {
        let map = ParametersMap::from_json_str(
            r#"{ "STL": { "merge_facets": true }, "STEP": { "encoding": "utf8" } }"#,
        )
        .unwrap();

        let stl = map.find_reader_parameters(Format::Stl).unwrap();
        assert_eq!(stl.get::<bool>("merge_facets"), Some(true));
        assert!(map.find_reader_parameters(Format::Obj).is_none());
    }

    #[test]
    fn test_map_rejects_unknown_format() {
        let result = ParametersMap::from_json_str(r#"{ "NOT_A_FORMAT": {} }"#);
        assert!(matches!(result, Err(IoError::Parameters(_))));
    }
}
