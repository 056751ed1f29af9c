//! 文件格式定义
//!
//! 每种格式有一个标识符、显示名称和若干文件扩展名别名（小写、有序）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 已知的文件格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Format {
    #[default]
    Unknown,
    Image,
    Step,
    Iges,
    OccBrep,
    Stl,
    Obj,
    Gltf,
    Vrml,
    Amf,
    Dxf,
    Ply,
    Off,
    /// ZCAD 原生格式
    Zcad,
}

impl Format {
    /// 除 `Unknown` 外的全部格式
    pub const ALL: [Format; 13] = [
        Format::Image,
        Format::Step,
        Format::Iges,
        Format::OccBrep,
        Format::Stl,
        Format::Obj,
        Format::Gltf,
        Format::Vrml,
        Format::Amf,
        Format::Dxf,
        Format::Ply,
        Format::Off,
        Format::Zcad,
    ];

    pub fn all() -> &'static [Format] {
        &Self::ALL
    }

    /// 标识符，同时用作序列化名称
    pub fn identifier(self) -> &'static str {
        match self {
            Format::Unknown => "UNKNOWN",
            Format::Image => "IMAGE",
            Format::Step => "STEP",
            Format::Iges => "IGES",
            Format::OccBrep => "OCCBREP",
            Format::Stl => "STL",
            Format::Obj => "OBJ",
            Format::Gltf => "GLTF",
            Format::Vrml => "VRML",
            Format::Amf => "AMF",
            Format::Dxf => "DXF",
            Format::Ply => "PLY",
            Format::Off => "OFF",
            Format::Zcad => "ZCAD",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Unknown => "Format_Unknown",
            Format::Image => "Image",
            Format::Step => "STEP(ISO 10303)",
            Format::Iges => "IGES(ASME Y14.26M)",
            Format::OccBrep => "OpenCascade BREP",
            Format::Stl => "STL(STereo-Lithography)",
            Format::Obj => "Wavefront OBJ",
            Format::Gltf => "glTF(GL Transmission Format)",
            Format::Vrml => "VRML(ISO/CEI 14772-2)",
            Format::Amf => "Additive manufacturing file format(ISO/ASTM 52915:2016)",
            Format::Dxf => "Drawing Exchange Format",
            Format::Ply => "PLY(Polygon File Format)",
            Format::Off => "Object File Format",
            Format::Zcad => "ZCAD Drawing",
        }
    }

    /// 扩展名别名（不含点，小写）
    pub fn file_suffixes(self) -> &'static [&'static str] {
        match self {
            Format::Unknown => &[],
            Format::Image => &["bmp", "jpeg", "jpg", "png", "gif", "ppm", "tiff"],
            Format::Step => &["step", "stp"],
            Format::Iges => &["iges", "igs"],
            Format::OccBrep => &["brep", "rle", "occbrep"],
            Format::Stl => &["stl"],
            Format::Obj => &["obj"],
            Format::Gltf => &["gltf", "glb"],
            Format::Vrml => &["wrl", "wrz", "vrml"],
            Format::Amf => &["amf"],
            Format::Dxf => &["dxf"],
            Format::Ply => &["ply"],
            Format::Off => &["off"],
            Format::Zcad => &["zcad"],
        }
    }

    /// 扩展名是否属于该格式（忽略大小写和前导点）
    pub fn matches_suffix(self, suffix: &str) -> bool {
        let suffix = suffix.strip_prefix('.').unwrap_or(suffix);
        !suffix.is_empty()
            && self
                .file_suffixes()
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(suffix))
    }

    /// 是否是网格格式
    pub fn provides_mesh(self) -> bool {
        matches!(
            self,
            Format::Stl | Format::Obj | Format::Gltf | Format::Vrml | Format::Amf | Format::Ply | Format::Off
        )
    }

    /// 是否是 B-Rep 实体格式
    pub fn provides_brep(self) -> bool {
        matches!(self, Format::Step | Format::Iges | Format::OccBrep)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognized format identifier: {0}")]
pub struct ParseFormatError(pub String);

impl FromStr for Format {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Format::ALL
            .iter()
            .copied()
            .find(|format| format.identifier().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseFormatError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_matching() {
        assert!(Format::Step.matches_suffix("StEp"));
        assert!(Format::Step.matches_suffix(".STP"));
        assert!(!Format::Step.matches_suffix("stl"));
        assert!(!Format::Step.matches_suffix(""));
        assert!(!Format::Unknown.matches_suffix("unknown"));
    }

    #[test]
    fn test_identifier_roundtrip() {
        for &format in Format::all() {
            assert_eq!(format.identifier().parse::<Format>(), Ok(format));
        }
        assert_eq!("occbrep".parse::<Format>(), Ok(Format::OccBrep));
        assert!("nope".parse::<Format>().is_err());
    }

    #[test]
    fn test_serde_uses_identifier() {
        let json = serde_json::to_string(&Format::OccBrep).unwrap();
        assert_eq!(json, "\"OCCBREP\"");
        let format: Format = serde_json::from_str("\"STL\"").unwrap();
        assert_eq!(format, Format::Stl);
    }

    #[test]
    fn test_classification() {
        assert!(Format::Stl.provides_mesh());
        assert!(!Format::Stl.provides_brep());
        assert!(Format::Iges.provides_brep());
        assert!(!Format::Dxf.provides_mesh());
    }
}
