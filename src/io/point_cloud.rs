//! This module reads and writes point clouds in the PCD format (version 0.7).
//!
//! A PCD file starts with a text header, one key and its values per line:
//!
//! - `VERSION`: format version, ignored
//! - `FIELDS`: the names of the fields in each point record, e.g. `x y z rgb`
//! - `SIZE`: the size in bytes of one element of each field
//! - `TYPE`: `F` (float), `U` (unsigned integer) or `I` (signed integer) for each field
//! - `COUNT`: the number of elements in each field, 1 for every field if absent
//! - `WIDTH`, `HEIGHT`: the layout of the cloud, `HEIGHT` is 1 for unorganized clouds
//! - `VIEWPOINT`: the sensor pose, ignored
//! - `POINTS`: the number of points, `WIDTH * HEIGHT` if absent
//! - `DATA`: `ascii` or `binary`, always the last header line
//!
//! Lines starting with `#` are comments. ASCII data has one point per line with whitespace
//! separated values. Binary data is the point records packed back to back, little-endian.
//!
//! Colors come from a packed `rgb` or `rgba` field, whose 32-bit pattern holds red in bits 16-23,
//! green in bits 8-15 and blue in bits 0-7, or from separate `r`, `g`, `b` fields. Float channels
//! are taken to be in 0..1. Fields the cloud has no use for are skipped, and points with a
//! non-finite coordinate (the holes of an organized cloud) are dropped.

use crate::geom3::point_cloud::PointCloudFeatures;
use crate::{CloudError, Point3, PointCloud, Result};
use itertools::Itertools;
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// How the point records of a written PCD file are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdEncoding {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Unsigned,
    Signed,
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    size: usize,
    kind: Kind,
    /// Byte offset of the field in a binary record
    offset: usize,
    /// Index of the field's first value on an ASCII line
    column: usize,
}

/// One decoded value, along with its low 32 bits for packed color fields.
#[derive(Debug, Clone, Copy)]
struct Scalar {
    value: f64,
    bits: u32,
}

struct Header {
    fields: Vec<Field>,
    points: usize,
    encoding: PcdEncoding,
    record_size: usize,
    columns: usize,
}

enum ColorSource {
    Packed(usize),
    Channels([usize; 3]),
}

fn parse_values<T: std::str::FromStr>(key: &str, values: &[&str]) -> Result<Vec<T>> {
    values
        .iter()
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| CloudError::unreadable(format!("bad {key} value '{v}'")))
        })
        .collect()
}

fn parse_single(key: &str, values: &[&str]) -> Result<usize> {
    match parse_values::<usize>(key, values)?.as_slice() {
        [v] => Ok(*v),
        _ => Err(CloudError::unreadable(format!("{key} should have one value"))),
    }
}

fn parse_kind(t: &str) -> Result<Kind> {
    match t {
        "F" => Ok(Kind::Float),
        "U" => Ok(Kind::Unsigned),
        "I" => Ok(Kind::Signed),
        _ => Err(CloudError::unreadable(format!("unknown field type '{t}'"))),
    }
}

/// Parse the header, returning it and the byte offset where the point data begins.
fn parse_header(bytes: &[u8]) -> Result<(Header, usize)> {
    let mut names: Option<Vec<String>> = None;
    let mut sizes: Option<Vec<usize>> = None;
    let mut kinds: Option<Vec<Kind>> = None;
    let mut counts: Option<Vec<usize>> = None;
    let mut width = None;
    let mut height = None;
    let mut points = None;
    let mut pos = 0;

    let encoding = loop {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| CloudError::unreadable("the header has no DATA line"))?;
        let line = std::str::from_utf8(&bytes[pos..pos + end])
            .map_err(|_| CloudError::unreadable("the header is not text"))?
            .trim();
        pos += end + 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let key = tokens.next().unwrap_or_default().to_ascii_uppercase();
        let values = tokens.collect::<Vec<_>>();

        match key.as_str() {
            "VERSION" | "VIEWPOINT" => {}
            "FIELDS" => names = Some(values.iter().map(|s| s.to_string()).collect()),
            "SIZE" => sizes = Some(parse_values(&key, &values)?),
            "TYPE" => {
                kinds = Some(values.iter().map(|t| parse_kind(t)).collect::<Result<_>>()?)
            }
            "COUNT" => counts = Some(parse_values(&key, &values)?),
            "WIDTH" => width = Some(parse_single(&key, &values)?),
            "HEIGHT" => height = Some(parse_single(&key, &values)?),
            "POINTS" => points = Some(parse_single(&key, &values)?),
            "DATA" => {
                break match values.first().copied() {
                    Some("ascii") => PcdEncoding::Ascii,
                    Some("binary") => PcdEncoding::Binary,
                    Some(other) => {
                        return Err(CloudError::unreadable(format!(
                            "unsupported DATA encoding '{other}'"
                        )));
                    }
                    None => return Err(CloudError::unreadable("DATA has no encoding")),
                };
            }
            other => {
                return Err(CloudError::unreadable(format!(
                    "unknown header key '{other}'"
                )));
            }
        }
    };

    let names = names.ok_or_else(|| CloudError::unreadable("the header has no FIELDS"))?;
    let sizes = sizes.ok_or_else(|| CloudError::unreadable("the header has no SIZE"))?;
    let kinds = kinds.ok_or_else(|| CloudError::unreadable("the header has no TYPE"))?;
    let counts = counts.unwrap_or_else(|| vec![1; names.len()]);
    if sizes.len() != names.len() || kinds.len() != names.len() || counts.len() != names.len() {
        return Err(CloudError::unreadable(
            "FIELDS, SIZE, TYPE and COUNT have different lengths",
        ));
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut offset: usize = 0;
    let mut column: usize = 0;
    for (((name, size), kind), count) in names.into_iter().zip(sizes).zip(kinds).zip(counts) {
        let valid = match kind {
            Kind::Float => matches!(size, 4 | 8),
            Kind::Unsigned | Kind::Signed => matches!(size, 1 | 2 | 4 | 8),
        };
        if !valid || count == 0 {
            return Err(CloudError::unreadable(format!(
                "field '{name}' has an unsupported layout ({kind:?}, size {size}, count {count})"
            )));
        }
        let start = offset;
        offset = size
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or_else(|| CloudError::unreadable(format!("field '{name}' is too large")))?;
        fields.push(Field {
            name,
            size,
            kind,
            offset: start,
            column,
        });
        column = column
            .checked_add(count)
            .ok_or_else(|| CloudError::unreadable("COUNT is too large"))?;
    }

    let points = match (points, width, height) {
        (Some(p), _, _) => p,
        (None, Some(w), h) => w
            .checked_mul(h.unwrap_or(1))
            .ok_or_else(|| CloudError::unreadable("WIDTH * HEIGHT is too large"))?,
        (None, None, _) => return Err(CloudError::unreadable("the header has no POINTS")),
    };

    let header = Header {
        fields,
        points,
        encoding,
        record_size: offset,
        columns: column,
    };
    Ok((header, pos))
}

impl Header {
    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn xyz(&self) -> Result<[usize; 3]> {
        let find = |name: &str| {
            self.field_index(name)
                .ok_or_else(|| CloudError::unreadable(format!("the cloud has no '{name}' field")))
        };
        Ok([find("x")?, find("y")?, find("z")?])
    }

    fn color_source(&self) -> Option<ColorSource> {
        if let Some(i) = self
            .field_index("rgb")
            .or_else(|| self.field_index("rgba"))
        {
            return Some(ColorSource::Packed(i));
        }
        match (
            self.field_index("r"),
            self.field_index("g"),
            self.field_index("b"),
        ) {
            (Some(r), Some(g), Some(b)) => Some(ColorSource::Channels([r, g, b])),
            _ => None,
        }
    }
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut a = [0; N];
    a.copy_from_slice(&bytes[..N]);
    a
}

fn decode_binary(field: &Field, record: &[u8]) -> Scalar {
    let b = &record[field.offset..field.offset + field.size];
    let float = |v: f64| Scalar {
        value: v,
        bits: (v as f32).to_bits(),
    };
    let int = |v: i128| Scalar {
        value: v as f64,
        bits: v as u32,
    };
    match (field.kind, field.size) {
        (Kind::Float, 4) => {
            let v = f32::from_le_bytes(le(b));
            Scalar {
                value: v as f64,
                bits: v.to_bits(),
            }
        }
        (Kind::Float, _) => float(f64::from_le_bytes(le(b))),
        (Kind::Unsigned, 1) => int(b[0] as i128),
        (Kind::Unsigned, 2) => int(u16::from_le_bytes(le(b)) as i128),
        (Kind::Unsigned, 4) => int(u32::from_le_bytes(le(b)) as i128),
        (Kind::Unsigned, _) => int(u64::from_le_bytes(le(b)) as i128),
        (Kind::Signed, 1) => int(b[0] as i8 as i128),
        (Kind::Signed, 2) => int(i16::from_le_bytes(le(b)) as i128),
        (Kind::Signed, 4) => int(i32::from_le_bytes(le(b)) as i128),
        (Kind::Signed, _) => int(i64::from_le_bytes(le(b)) as i128),
    }
}

fn decode_token(field: &Field, token: &str) -> Result<Scalar> {
    let bad = || CloudError::unreadable(format!("cannot read '{token}' as field '{}'", field.name));
    Ok(match field.kind {
        Kind::Float if field.size == 4 => {
            let v = token.parse::<f32>().map_err(|_| bad())?;
            Scalar {
                value: v as f64,
                bits: v.to_bits(),
            }
        }
        Kind::Float => {
            let v = token.parse::<f64>().map_err(|_| bad())?;
            Scalar {
                value: v,
                bits: (v as f32).to_bits(),
            }
        }
        Kind::Unsigned => {
            let v = token.parse::<u64>().map_err(|_| bad())?;
            Scalar {
                value: v as f64,
                bits: v as u32,
            }
        }
        Kind::Signed => {
            let v = token.parse::<i64>().map_err(|_| bad())?;
            Scalar {
                value: v as f64,
                bits: v as u32,
            }
        }
    })
}

fn unpack_rgb(bits: u32) -> [u8; 3] {
    [(bits >> 16) as u8, (bits >> 8) as u8, bits as u8]
}

fn pack_rgb(c: &[u8; 3]) -> u32 {
    (u32::from(c[0]) << 16) | (u32::from(c[1]) << 8) | u32::from(c[2])
}

fn channel(field: &Field, s: Scalar) -> u8 {
    let v = match field.kind {
        Kind::Float => s.value * 255.0,
        _ => s.value,
    };
    v.round().clamp(0.0, 255.0) as u8
}

/// Collects decoded points and colors, skipping points with non-finite coordinates.
struct Collector<'a> {
    header: &'a Header,
    xyz: [usize; 3],
    color: Option<ColorSource>,
    points: Vec<Point3>,
    colors: Vec<[u8; 3]>,
    skipped: usize,
}

impl<'a> Collector<'a> {
    fn new(header: &'a Header, capacity: usize) -> Result<Self> {
        Ok(Self {
            header,
            xyz: header.xyz()?,
            color: header.color_source(),
            points: Vec::with_capacity(capacity),
            colors: Vec::new(),
            skipped: 0,
        })
    }

    fn push(&mut self, get: impl Fn(usize) -> Result<Scalar>) -> Result<()> {
        let [x, y, z] = self.xyz;
        let p = Point3::new(get(x)?.value, get(y)?.value, get(z)?.value);
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            self.skipped += 1;
            return Ok(());
        }
        self.points.push(p);

        match &self.color {
            Some(ColorSource::Packed(i)) => self.colors.push(unpack_rgb(get(*i)?.bits)),
            Some(ColorSource::Channels(rgb)) => {
                let mut c = [0; 3];
                for (k, &i) in rgb.iter().enumerate() {
                    c[k] = channel(&self.header.fields[i], get(i)?);
                }
                self.colors.push(c);
            }
            None => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<PointCloud> {
        if self.points.is_empty() {
            return Err(CloudError::unreadable("the file contains no points"));
        }
        if self.skipped > 0 {
            debug!("skipped {} points with non-finite coordinates", self.skipped);
        }
        let colors = self.color.map(|_| self.colors);
        PointCloud::try_new(self.points, colors)
    }
}

/// Parse the contents of a PCD file.
pub fn parse_pcd(bytes: &[u8]) -> Result<PointCloud> {
    let (header, start) = parse_header(bytes)?;
    let data = &bytes[start..];

    match header.encoding {
        PcdEncoding::Binary => {
            let needed = header
                .points
                .checked_mul(header.record_size)
                .filter(|&n| n <= data.len())
                .ok_or_else(|| {
                    CloudError::unreadable(format!(
                        "binary data is truncated: {} bytes for {} points of {} bytes",
                        data.len(),
                        header.points,
                        header.record_size
                    ))
                })?;
            let mut collector = Collector::new(&header, header.points)?;
            for record in data[..needed].chunks_exact(header.record_size) {
                collector.push(|i| Ok(decode_binary(&header.fields[i], record)))?;
            }
            collector.finish()
        }
        PcdEncoding::Ascii => {
            let text = std::str::from_utf8(data)
                .map_err(|_| CloudError::unreadable("ascii data is not text"))?;
            // Every point takes at least one byte per value
            let capacity = header.points.min(data.len() / header.columns.max(1));
            let mut collector = Collector::new(&header, capacity)?;
            let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
            for n in 0..header.points {
                let line = lines.next().ok_or_else(|| {
                    CloudError::unreadable(format!(
                        "ascii data is truncated: {n} of {} points",
                        header.points
                    ))
                })?;
                let tokens = line.split_whitespace().collect::<Vec<_>>();
                if tokens.len() < header.columns {
                    return Err(CloudError::unreadable(format!(
                        "line {} has {} values, expected {}",
                        n + 1,
                        tokens.len(),
                        header.columns
                    )));
                }
                collector.push(|i| {
                    let field = &header.fields[i];
                    decode_token(field, tokens[field.column])
                })?;
            }
            collector.finish()
        }
    }
}

/// Read a point cloud from a PCD file. Any failure, including a file with no points, is reported
/// as `UnreadableCloud`.
pub fn read_pcd(path: &Path) -> Result<PointCloud> {
    let bytes = std::fs::read(path)
        .map_err(|e| CloudError::unreadable(format!("{}: {e}", path.display())))?;
    let cloud = parse_pcd(&bytes)?;
    debug!("read {} points from {}", cloud.len(), path.display());
    Ok(cloud)
}

/// Write a point cloud to a PCD file. Coordinates are stored as 64-bit floats; colors, if the
/// cloud has them, as a packed float `rgb` field.
pub fn write_pcd(path: &Path, cloud: &PointCloud, encoding: PcdEncoding) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let mut fields = vec![("x", 8), ("y", 8), ("z", 8)];
    if cloud.colors().is_some() {
        fields.push(("rgb", 4));
    }
    let n = cloud.len();

    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS {}", fields.iter().map(|f| f.0).join(" "))?;
    writeln!(writer, "SIZE {}", fields.iter().map(|f| f.1).join(" "))?;
    writeln!(writer, "TYPE {}", fields.iter().map(|_| "F").join(" "))?;
    writeln!(writer, "COUNT {}", fields.iter().map(|_| 1).join(" "))?;
    writeln!(writer, "WIDTH {n}")?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {n}")?;

    match encoding {
        PcdEncoding::Ascii => {
            writeln!(writer, "DATA ascii")?;
            for (i, p) in cloud.points().iter().enumerate() {
                write!(writer, "{} {} {}", p.x, p.y, p.z)?;
                if let Some(colors) = cloud.colors() {
                    write!(writer, " {:e}", f32::from_bits(pack_rgb(&colors[i])))?;
                }
                writeln!(writer)?;
            }
        }
        PcdEncoding::Binary => {
            writeln!(writer, "DATA binary")?;
            for (i, p) in cloud.points().iter().enumerate() {
                writer.write_all(&p.x.to_le_bytes())?;
                writer.write_all(&p.y.to_le_bytes())?;
                writer.write_all(&p.z.to_le_bytes())?;
                if let Some(colors) = cloud.colors() {
                    writer.write_all(&pack_rgb(&colors[i]).to_le_bytes())?;
                }
            }
        }
    }

    writer.flush()?;
    debug!("wrote {n} points to {}", path.display());
    Ok(())
}
