//! Splat file decoding.
//!
//! Two formats are understood:
//! - `.splat`: packed 32-byte records (position `3×f32`, scale `3×f32`,
//!   color `4×u8`, rotation `4×u8`), little endian.
//! - `.ply`: ASCII or binary little-endian, vertex element with at least
//!   `x`, `y`, `z`. Colors come from `f_dc_*`/`opacity` (3DGS layout) or
//!   `red`/`green`/`blue` when present.
//!
//! Only centers and colors are kept.

use anyhow::{anyhow, bail, Context};
use glam::Vec3;

use crate::splat_mesh::SplatCloud;

/// Size of one `.splat` record in bytes.
pub const SPLAT_RECORD_SIZE: usize = 32;

/// Zeroth-order spherical harmonic constant.
const SH_C0: f32 = 0.282_094_8;

/// Decode by file extension. Unknown extensions are tried as `.splat`.
pub fn decode(file_name: &str, bytes: &[u8]) -> anyhow::Result<SplatCloud> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".ply") || bytes.starts_with(b"ply\n") || bytes.starts_with(b"ply\r\n") {
        decode_ply(bytes).with_context(|| format!("Failed to decode PLY '{}'", file_name))
    } else {
        decode_splat(bytes).with_context(|| format!("Failed to decode splat '{}'", file_name))
    }
}

/// Decode the packed `.splat` layout.
pub fn decode_splat(bytes: &[u8]) -> anyhow::Result<SplatCloud> {
    if bytes.len() % SPLAT_RECORD_SIZE != 0 {
        bail!(
            "Length {} is not a multiple of the {}-byte record size",
            bytes.len(),
            SPLAT_RECORD_SIZE
        );
    }

    let count = bytes.len() / SPLAT_RECORD_SIZE;
    let mut centers = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(count);

    for record in bytes.chunks_exact(SPLAT_RECORD_SIZE) {
        centers.push(Vec3::new(
            read_f32_le(record, 0),
            read_f32_le(record, 4),
            read_f32_le(record, 8),
        ));
        // Bytes 12..24 hold scale, 28..32 rotation.
        colors.push([
            record[24] as f32 / 255.0,
            record[25] as f32 / 255.0,
            record[26] as f32 / 255.0,
            record[27] as f32 / 255.0,
        ]);
    }

    Ok(SplatCloud::with_colors(centers, colors))
}

fn read_f32_le(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyEncoding {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyScalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PlyScalar {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => PlyScalar::I8,
            "uchar" | "uint8" => PlyScalar::U8,
            "short" | "int16" => PlyScalar::I16,
            "ushort" | "uint16" => PlyScalar::U16,
            "int" | "int32" => PlyScalar::I32,
            "uint" | "uint32" => PlyScalar::U32,
            "float" | "float32" => PlyScalar::F32,
            "double" | "float64" => PlyScalar::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            PlyScalar::I8 | PlyScalar::U8 => 1,
            PlyScalar::I16 | PlyScalar::U16 => 2,
            PlyScalar::I32 | PlyScalar::U32 | PlyScalar::F32 => 4,
            PlyScalar::F64 => 8,
        }
    }

    fn read_le(self, b: &[u8]) -> f32 {
        match self {
            PlyScalar::I8 => b[0] as i8 as f32,
            PlyScalar::U8 => b[0] as f32,
            PlyScalar::I16 => i16::from_le_bytes([b[0], b[1]]) as f32,
            PlyScalar::U16 => u16::from_le_bytes([b[0], b[1]]) as f32,
            PlyScalar::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
            PlyScalar::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
            PlyScalar::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            PlyScalar::F64 => {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
            }
        }
    }
}

#[derive(Debug)]
struct PlyProperty {
    name: String,
    scalar: PlyScalar,
}

#[derive(Debug)]
struct PlyHeader {
    encoding: PlyEncoding,
    vertex_count: usize,
    properties: Vec<PlyProperty>,
    body_offset: usize,
}

impl PlyHeader {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    fn stride(&self) -> usize {
        self.properties.iter().map(|p| p.scalar.size()).sum()
    }

    fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.properties
            .iter()
            .map(|p| {
                let o = offset;
                offset += p.scalar.size();
                o
            })
            .collect()
    }
}

fn parse_ply_header(bytes: &[u8]) -> anyhow::Result<PlyHeader> {
    const END: &[u8] = b"end_header";
    let end = bytes
        .windows(END.len())
        .position(|w| w == END)
        .ok_or_else(|| anyhow!("Missing end_header"))?;
    let newline = bytes[end..]
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| anyhow!("Truncated header"))?;
    let body_offset = end + newline + 1;

    let text = std::str::from_utf8(&bytes[..end]).context("Header is not UTF-8")?;
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some("ply") {
        bail!("Not a PLY file");
    }

    let mut encoding = None;
    let mut vertex_count = 0;
    let mut properties = Vec::new();
    let mut in_vertex = false;

    for line in lines {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("format") => {
                encoding = Some(match parts.next() {
                    Some("ascii") => PlyEncoding::Ascii,
                    Some("binary_little_endian") => PlyEncoding::BinaryLittleEndian,
                    Some(other) => bail!("Unsupported PLY format '{}'", other),
                    None => bail!("Invalid format line"),
                });
            }
            Some("element") => {
                in_vertex = parts.next() == Some("vertex");
                if in_vertex {
                    vertex_count = parts
                        .next()
                        .ok_or_else(|| anyhow!("Invalid element line"))?
                        .parse()
                        .context("Invalid vertex count")?;
                }
            }
            Some("property") if in_vertex => {
                let ty = parts.next().ok_or_else(|| anyhow!("Invalid property line"))?;
                if ty == "list" {
                    bail!("List properties on vertices are not supported");
                }
                let scalar = PlyScalar::parse(ty)
                    .ok_or_else(|| anyhow!("Unknown property type '{}'", ty))?;
                let name = parts.next().ok_or_else(|| anyhow!("Property without name"))?;
                properties.push(PlyProperty {
                    name: name.to_string(),
                    scalar,
                });
            }
            _ => {}
        }
    }

    Ok(PlyHeader {
        encoding: encoding.ok_or_else(|| anyhow!("Missing format line"))?,
        vertex_count,
        properties,
        body_offset,
    })
}

/// Decode a PLY point or 3DGS file.
pub fn decode_ply(bytes: &[u8]) -> anyhow::Result<SplatCloud> {
    let header = parse_ply_header(bytes)?;
    let position = [
        header.index_of("x").ok_or_else(|| anyhow!("Missing x property"))?,
        header.index_of("y").ok_or_else(|| anyhow!("Missing y property"))?,
        header.index_of("z").ok_or_else(|| anyhow!("Missing z property"))?,
    ];
    let color = ColorSource::detect(&header);

    let rows: Vec<Vec<f32>> = match header.encoding {
        PlyEncoding::Ascii => read_ascii_rows(&header, &bytes[header.body_offset..])?,
        PlyEncoding::BinaryLittleEndian => read_binary_rows(&header, &bytes[header.body_offset..])?,
    };

    let mut centers = Vec::with_capacity(rows.len());
    let mut colors = Vec::new();
    for row in &rows {
        centers.push(Vec3::new(row[position[0]], row[position[1]], row[position[2]]));
        if let Some(rgba) = color.rgba(row) {
            colors.push(rgba);
        }
    }

    Ok(SplatCloud::with_colors(centers, colors))
}

fn read_ascii_rows(header: &PlyHeader, body: &[u8]) -> anyhow::Result<Vec<Vec<f32>>> {
    let text = std::str::from_utf8(body).context("ASCII body is not UTF-8")?;
    let mut rows = Vec::with_capacity(header.vertex_count);
    for line in text.lines().filter(|l| !l.trim().is_empty()).take(header.vertex_count) {
        let row = line
            .split_whitespace()
            .map(|s| s.parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid number in vertex row")?;
        if row.len() < header.properties.len() {
            bail!("Vertex row has {} values, expected {}", row.len(), header.properties.len());
        }
        rows.push(row);
    }
    if rows.len() < header.vertex_count {
        bail!("Expected {} vertices, found {}", header.vertex_count, rows.len());
    }
    Ok(rows)
}

fn read_binary_rows(header: &PlyHeader, body: &[u8]) -> anyhow::Result<Vec<Vec<f32>>> {
    let stride = header.stride();
    let needed = stride * header.vertex_count;
    if body.len() < needed {
        bail!("Body has {} bytes, expected at least {}", body.len(), needed);
    }
    let offsets = header.offsets();
    Ok(body[..needed]
        .chunks_exact(stride.max(1))
        .take(header.vertex_count)
        .map(|record| {
            header
                .properties
                .iter()
                .zip(&offsets)
                .map(|(p, &o)| p.scalar.read_le(&record[o..]))
                .collect()
        })
        .collect())
}

enum ColorSource {
    None,
    ShDc { dc: [usize; 3], opacity: Option<usize> },
    Rgb { rgb: [usize; 3], alpha: Option<usize> },
}

impl ColorSource {
    fn detect(header: &PlyHeader) -> Self {
        let find3 = |a: &str, b: &str, c: &str| {
            Some([header.index_of(a)?, header.index_of(b)?, header.index_of(c)?])
        };
        if let Some(dc) = find3("f_dc_0", "f_dc_1", "f_dc_2") {
            ColorSource::ShDc {
                dc,
                opacity: header.index_of("opacity"),
            }
        } else if let Some(rgb) = find3("red", "green", "blue") {
            ColorSource::Rgb {
                rgb,
                alpha: header.index_of("alpha"),
            }
        } else {
            ColorSource::None
        }
    }

    fn rgba(&self, row: &[f32]) -> Option<[f32; 4]> {
        match self {
            ColorSource::None => None,
            ColorSource::ShDc { dc, opacity } => {
                let channel = |i: usize| (0.5 + SH_C0 * row[dc[i]]).clamp(0.0, 1.0);
                let alpha = opacity.map(|o| 1.0 / (1.0 + (-row[o]).exp())).unwrap_or(1.0);
                Some([channel(0), channel(1), channel(2), alpha])
            }
            ColorSource::Rgb { rgb, alpha } => Some([
                row[rgb[0]] / 255.0,
                row[rgb[1]] / 255.0,
                row[rgb[2]] / 255.0,
                alpha.map(|a| row[a] / 255.0).unwrap_or(1.0),
            ]),
        }
    }
}
