//! 格式探测谓词
//!
//! 每个谓词只看文件开头的一段字节样本（以及文件总大小），返回识别出的
//! 格式或 `Format::Unknown`。谓词无状态、无副作用，按注册顺序依次尝试，
//! 第一个非 `Unknown` 的结果胜出，因此更具体的检查应排在更宽松的前面。
//!
//! 所有比较都对样本长度做边界检查：样本过短视为不匹配，而不是错误。

use crate::format::Format;
use regex::bytes::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// 探测时读取的文件头长度
pub const PROBE_SAMPLE_SIZE: usize = 2048;

/// 探测谓词
pub type FormatProbe = Box<dyn Fn(&FormatProbeInput) -> Format + Send + Sync>;

/// 探测输入
#[derive(Debug, Clone, Default)]
pub struct FormatProbeInput {
    pub filepath: PathBuf,
    /// 文件开头的字节样本
    pub contents_begin: Vec<u8>,
    /// 文件总大小（提示值，不一定全部读取）
    pub hint_full_size: u64,
}

impl FormatProbeInput {
    /// 直接由内存样本构造，`hint_full_size` 取样本长度
    pub fn from_bytes(filepath: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        Self {
            filepath: filepath.into(),
            contents_begin: bytes.to_vec(),
            hint_full_size: bytes.len() as u64,
        }
    }

    /// 读取文件开头 [`PROBE_SAMPLE_SIZE`] 字节，不足部分补零
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let hint_full_size = file.metadata()?.len();

        let mut contents_begin = vec![0u8; PROBE_SAMPLE_SIZE];
        let mut filled = 0;
        while filled < PROBE_SAMPLE_SIZE {
            let n = file.read(&mut contents_begin[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(Self {
            filepath: path.to_path_buf(),
            contents_begin,
            hint_full_size,
        })
    }
}

fn skip_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn starts_with_token_after_spaces(bytes: &[u8], token: &[u8]) -> bool {
    skip_spaces(bytes).starts_with(token)
}

/// STEP：`^\s*ISO-10303-21\s*;\s*HEADER`
pub fn probe_format_step(input: &FormatProbeInput) -> Format {
    const ISO_ID: &[u8] = b"ISO-10303-21";
    const HEADER_TOKEN: &[u8] = b"HEADER";

    let rest = skip_spaces(&input.contents_begin);
    let Some(rest) = rest.strip_prefix(ISO_ID) else {
        return Format::Unknown;
    };
    let Some(rest) = skip_spaces(rest).strip_prefix(b";") else {
        return Format::Unknown;
    };

    if skip_spaces(rest).starts_with(HEADER_TOKEN) {
        Format::Step
    } else {
        Format::Unknown
    }
}

/// IGES：首行第 73 列为 `S`，73-80 列为序号 1，随后换行
pub fn probe_format_iges(input: &FormatProbeInput) -> Format {
    let sample = &input.contents_begin;
    if sample.len() <= 80 || sample[72] != b'S' {
        return Format::Unknown;
    }

    let sequence = &sample[73..80];
    if !sequence.iter().all(|&c| c == b' ' || c.is_ascii_digit()) {
        return Format::Unknown;
    }
    if !matches!(sample[80], b'\n' | b'\r' | 0x0c) {
        return Format::Unknown;
    }

    let digits: Vec<u8> = skip_spaces(sequence)
        .iter()
        .copied()
        .take_while(u8::is_ascii_digit)
        .collect();
    let number = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse::<u32>().ok());

    if number == Some(1) {
        Format::Iges
    } else {
        Format::Unknown
    }
}

/// OpenCascade BRep：`^\s*DBRep_DrawableShape`
pub fn probe_format_occ_brep(input: &FormatProbeInput) -> Format {
    if starts_with_token_after_spaces(&input.contents_begin, b"DBRep_DrawableShape") {
        Format::OccBrep
    } else {
        Format::Unknown
    }
}

/// 二进制 STL 头长度：80 字节注释 + 4 字节面片数
const BINARY_STL_HEADER_SIZE: u64 = 80 + 4;
/// 每个面片：12 个 f32（法向 + 3 顶点）+ 2 字节属性
const BINARY_STL_FACET_SIZE: u64 = 12 * 4 + 2;

/// STL：二进制（面片数与文件大小严格吻合）或 ASCII（`^\s*solid`）
pub fn probe_format_stl(input: &FormatProbeInput) -> Format {
    let sample = &input.contents_begin;
    if let Some(count) = sample.get(80..84) {
        let facet_count = u32::from_le_bytes([count[0], count[1], count[2], count[3]]) as u64;
        if BINARY_STL_FACET_SIZE * facet_count + BINARY_STL_HEADER_SIZE == input.hint_full_size {
            return Format::Stl;
        }
    }

    if starts_with_token_after_spaces(sample, b"solid") {
        Format::Stl
    } else {
        Format::Unknown
    }
}

static OBJ_LEADING_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    // 允许开头有 `#` 注释行，注释内容可以是任意字节
    Regex::new(r"\A(?:[ \t\r\n]*#(?-u:[^\n])*\n)*\s*(?:v|vt|vn|vp|surf)[ \t]+[-+]?[0-9.]+\s")
        .expect("valid OBJ probe regex")
});

/// Wavefront OBJ：开头的顶点类记录
pub fn probe_format_obj(input: &FormatProbeInput) -> Format {
    if OBJ_LEADING_RECORD.is_match(&input.contents_begin) {
        Format::Obj
    } else {
        Format::Unknown
    }
}

static DXF_LEADING_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A\s*0[ \t]*\r?\n\s*SECTION(?:\s|\x00|\z)").expect("valid DXF probe regex")
});

/// ASCII DXF：以组码 `0` / `SECTION` 开头
pub fn probe_format_dxf(input: &FormatProbeInput) -> Format {
    if DXF_LEADING_SECTION.is_match(&input.contents_begin) {
        Format::Dxf
    } else {
        Format::Unknown
    }
}

/// ZCAD 原生文件魔数
pub const ZCAD_MAGIC: &[u8; 4] = b"ZCAD";

/// ZCAD 原生格式：4 字节魔数
pub fn probe_format_zcad(input: &FormatProbeInput) -> Format {
    if input.contents_begin.starts_with(ZCAD_MAGIC) {
        Format::Zcad
    } else {
        Format::Unknown
    }
}

/// 预置谓词，按探测顺序排列
pub fn predefined_format_probes() -> Vec<FormatProbe> {
    vec![
        Box::new(probe_format_step),
        Box::new(probe_format_iges),
        Box::new(probe_format_occ_brep),
        Box::new(probe_format_stl),
        Box::new(probe_format_obj),
        Box::new(probe_format_dxf),
        Box::new(probe_format_zcad),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(bytes: &[u8]) -> FormatProbeInput {
        FormatProbeInput::from_bytes("sample.bin", bytes)
    }

    fn padded(bytes: &[u8]) -> FormatProbeInput {
        let mut sample = bytes.to_vec();
        sample.resize(PROBE_SAMPLE_SIZE, 0);
        FormatProbeInput {
            filepath: PathBuf::from("sample.bin"),
            contents_begin: sample,
            hint_full_size: bytes.len() as u64,
        }
    }

    fn binary_stl(facet_count: u32) -> Vec<u8> {
        let mut bytes = vec![b' '; 80];
        bytes.extend_from_slice(&facet_count.to_le_bytes());
        bytes.resize(84 + facet_count as usize * 50, 0);
        bytes
    }

    #[test]
    fn test_step() {
        let sample = b"  ISO-10303-21 ;\n  HEADER;\nFILE_DESCRIPTION(('x'),'2;1');";
        assert_eq!(probe_format_step(&input(sample)), Format::Step);
        assert_eq!(probe_format_step(&padded(b"ISO-10303-21;HEADER")), Format::Step);
        assert_eq!(probe_format_step(&input(b"ISO-10303-21 HEADER")), Format::Unknown);
        assert_eq!(probe_format_step(&input(b"ISO-10303-21;")), Format::Unknown);
        assert_eq!(probe_format_step(&input(b"ISO-103")), Format::Unknown);
        assert_eq!(probe_format_step(&input(b"")), Format::Unknown);
    }

    fn iges_line(sequence: &str, terminator: u8) -> Vec<u8> {
        let mut line = vec![b' '; 72];
        line.push(b'S');
        line.extend_from_slice(format!("{:>7}", sequence).as_bytes());
        line.push(terminator);
        line
    }

    #[test]
    fn test_iges() {
        assert_eq!(probe_format_iges(&input(&iges_line("1", b'\n'))), Format::Iges);
        assert_eq!(probe_format_iges(&input(&iges_line("1", b'\r'))), Format::Iges);
        assert_eq!(probe_format_iges(&input(&iges_line("2", b'\n'))), Format::Unknown);
        assert_eq!(probe_format_iges(&input(&iges_line("1", b'x'))), Format::Unknown);
        assert_eq!(probe_format_iges(&input(&iges_line("1a", b'\n'))), Format::Unknown);

        // 截断到 80 字节，缺少换行位
        let truncated = iges_line("1", b'\n');
        assert_eq!(probe_format_iges(&input(&truncated[..80])), Format::Unknown);
    }

    #[test]
    fn test_occ_brep() {
        assert_eq!(
            probe_format_occ_brep(&input(b"\n DBRep_DrawableShape\n\nCASCADE Topology V1")),
            Format::OccBrep
        );
        assert_eq!(probe_format_occ_brep(&input(b"DBRep_Drawable")), Format::Unknown);
    }

    #[test]
    fn test_binary_stl_size_reconciliation() {
        for facet_count in [0u32, 1, 3, 12] {
            let bytes = binary_stl(facet_count);
            assert_eq!(probe_format_stl(&input(&bytes)), Format::Stl);

            // 面片数 ±1 后大小对不上
            let mut broken = bytes.clone();
            broken[80..84].copy_from_slice(&(facet_count + 1).to_le_bytes());
            assert_eq!(probe_format_stl(&input(&broken)), Format::Unknown);
            if facet_count > 0 {
                broken[80..84].copy_from_slice(&(facet_count - 1).to_le_bytes());
                assert_eq!(probe_format_stl(&input(&broken)), Format::Unknown);
            }
        }
    }

    #[test]
    fn test_binary_stl_with_sample_window() {
        // 样本只有文件开头，大小提示给出完整长度
        let bytes = binary_stl(100);
        let sample = bytes[..PROBE_SAMPLE_SIZE].to_vec();
        let probe = FormatProbeInput {
            filepath: PathBuf::from("mesh.bin"),
            contents_begin: sample,
            hint_full_size: bytes.len() as u64,
        };
        assert_eq!(probe_format_stl(&probe), Format::Stl);
    }

    #[test]
    fn test_ascii_stl() {
        assert_eq!(probe_format_stl(&input(b"  solid cube\nfacet normal 0 0 1")), Format::Stl);
        assert_eq!(probe_format_stl(&input(b"sol")), Format::Unknown);
    }

    #[test]
    fn test_obj() {
        assert_eq!(probe_format_obj(&input(b"v 1.0 2.0 3.0\n")), Format::Obj);
        assert_eq!(probe_format_obj(&input(b"  vn -0.5 0 1\n")), Format::Obj);
        assert_eq!(
            probe_format_obj(&input(b"# exported\n# by someone\nv 0.1 0.2 0.3\n")),
            Format::Obj
        );
        assert_eq!(probe_format_obj(&padded(b"v 1.0 2.0 3.0\n")), Format::Obj);
        assert_eq!(probe_format_obj(&input(b"# caf\xE9 \xFF\xFE\nv 1 2 3\n")), Format::Obj);
        assert_eq!(probe_format_obj(&input(b"f 1 2 3\n")), Format::Unknown);
        assert_eq!(probe_format_obj(&input(b"v 1.0")), Format::Unknown);
        assert_eq!(probe_format_obj(&input(b"vertex 1 2 3\n")), Format::Unknown);
    }

    #[test]
    fn test_dxf() {
        assert_eq!(probe_format_dxf(&input(b"  0\nSECTION\n  2\nHEADER\n")), Format::Dxf);
        assert_eq!(probe_format_dxf(&input(b"0\r\nSECTION\r\n")), Format::Dxf);
        assert_eq!(probe_format_dxf(&input(b"0\nSECTION")), Format::Dxf);
        assert_eq!(probe_format_dxf(&padded(b"0\nSECTION")), Format::Dxf);
        assert_eq!(probe_format_dxf(&input(b"0\nSECTIONS\n")), Format::Unknown);
        assert_eq!(probe_format_dxf(&input(b"0\nSECT")), Format::Unknown);
    }

    #[test]
    fn test_zcad_magic() {
        assert_eq!(probe_format_zcad(&input(b"ZCAD\x02\0\0\0")), Format::Zcad);
        assert_eq!(probe_format_zcad(&input(b"ZCA")), Format::Unknown);
    }

    #[test]
    fn test_each_sample_matches_exactly_one_predicate() {
        let samples: Vec<(Format, Vec<u8>)> = vec![
            (Format::Step, b"ISO-10303-21;\nHEADER;".to_vec()),
            (Format::Iges, iges_line("1", b'\n')),
            (Format::OccBrep, b"DBRep_DrawableShape\n".to_vec()),
            (Format::Stl, binary_stl(2)),
            (Format::Obj, b"v 0 0 0\n".to_vec()),
            (Format::Dxf, b"0\nSECTION\n".to_vec()),
            (Format::Zcad, b"ZCAD\x02\0\0\0".to_vec()),
        ];

        for (expected, bytes) in &samples {
            let probe_input = input(bytes);
            let hits: Vec<Format> = predefined_format_probes()
                .iter()
                .map(|probe| probe(&probe_input))
                .filter(|&f| f != Format::Unknown)
                .collect();
            assert_eq!(&hits, &[*expected], "sample for {}", expected);

            // 任意截断都不能 panic
            for len in 0..bytes.len() {
                let truncated = input(&bytes[..len]);
                for probe in predefined_format_probes() {
                    let _ = probe(&truncated);
                }
            }
        }
    }
}
