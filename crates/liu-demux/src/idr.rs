//! 关键帧 (IDR) 检测.
//!
//! seek 之后视频轨道必须从 IDR 帧开始投递. 检测器按 mime 判断码流格式,
//! 扫描样本中的 NAL 单元.
//!
//! # 支持的封装
//! - Annex B: `00 00 01` / `00 00 00 01` 起始码分隔
//! - 长度前缀: 4 字节大端长度 + NAL 数据 (AVCC / HVCC)

/// H.264 mime
pub const MIME_AVC: &str = "video/avc";
/// H.265 mime
pub const MIME_HEVC: &str = "video/hevc";

/// IDR 检测器
pub trait IdrDetector: Send + Sync {
    /// 样本是否包含 IDR 帧
    ///
    /// 无 IDR 概念的编码格式应返回 `true`.
    fn contains_idr(&self, mime: &str, data: &[u8]) -> bool;
}

/// 基于 NAL 单元类型的检测器 (H.264 / H.265)
#[derive(Debug, Default, Clone, Copy)]
pub struct NalIdrDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NalCodec {
    Avc,
    Hevc,
}

impl NalCodec {
    fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            MIME_AVC | "video/h264" => Some(Self::Avc),
            MIME_HEVC | "video/h265" => Some(Self::Hevc),
            _ => None,
        }
    }

    /// NAL 头首字节是否表示 IDR
    fn is_idr_header(self, header: u8) -> bool {
        match self {
            // nal_unit_type 低 5 位, 5 = IDR
            Self::Avc => header & 0x1F == 5,
            // nal_unit_type 6 位, 19 IDR_W_RADL / 20 IDR_N_LP
            Self::Hevc => matches!((header >> 1) & 0x3F, 19 | 20),
        }
    }
}

impl IdrDetector for NalIdrDetector {
    fn contains_idr(&self, mime: &str, data: &[u8]) -> bool {
        let Some(codec) = NalCodec::from_mime(mime) else {
            return true;
        };
        let headers = if is_annex_b(data) {
            annex_b_headers(data)
        } else {
            length_prefixed_headers(data)
        };
        headers.into_iter().any(|h| codec.is_idr_header(h))
    }
}

fn is_annex_b(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&[0, 0, 0, 1])
}

/// 收集 Annex B 流中每个 NAL 单元的首字节
fn annex_b_headers(data: &[u8]) -> Vec<u8> {
    let mut headers = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(&h) = data.get(i + 3) {
                headers.push(h);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    headers
}

/// 收集 4 字节长度前缀流中每个 NAL 单元的首字节
fn length_prefixed_headers(data: &[u8]) -> Vec<u8> {
    let mut headers = Vec::new();
    let mut pos = 0usize;
    while pos + 4 < data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;
        if len == 0 || pos + len > data.len() {
            break;
        }
        headers.push(data[pos]);
        pos += len;
    }
    headers
}
