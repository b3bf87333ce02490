// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! TrackVis (`.trk`) reader and writer.
//!
//! ```text
//! [Header, 1000 bytes]
//! - id_string "TRACK\0"          @0
//! - dim i16[3]                   @6
//! - voxel_size f32[3]            @12
//! - origin f32[3]                @24
//! - n_scalars i16                @36
//! - scalar_name char[10][20]     @38
//! - n_properties i16             @238
//! - property_name char[10][20]   @240
//! - vox_to_ras f32[4][4]         @440
//! - reserved char[444]           @504
//! - voxel_order char[4]          @948
//! - pad2 char[4]                 @952
//! - image_orientation f32[6]     @956
//! - pad1 char[2]                 @980
//! - invert/swap flags u8[6]      @982
//! - n_count i32                  @988
//! - version i32                  @992
//! - hdr_size i32 = 1000          @996
//! [Body, per streamline]
//! - n_points i32
//! - n_points * (3 + n_scalars) f32
//! - n_properties f32
//! ```
//!
//! Byte order is detected from `hdr_size`. Files are always written
//! little-endian.

use std::fs;
use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Result, StructuresError};
use crate::tractogram::{Point, Tractogram, TractogramHeader};

pub const HEADER_SIZE: usize = 1000;
const MAGIC: &[u8; 5] = b"TRACK";
const NAME_SLOTS: usize = 10;
const NAME_LEN: usize = 20;

/// Read a `.trk` file
pub fn read_trackvis<P: AsRef<Path>>(path: P) -> Result<Tractogram> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| StructuresError::io(path, e))?;
    let tractogram = parse_trackvis(&bytes)?;
    tracing::debug!(
        target: "tractograph-structures",
        "Read {} streamlines ({} points) from {}",
        tractogram.len(),
        tractogram.total_points(),
        path.display()
    );
    Ok(tractogram)
}

/// Parse TrackVis bytes in either byte order
pub fn parse_trackvis(bytes: &[u8]) -> Result<Tractogram> {
    if bytes.len() < HEADER_SIZE {
        return Err(StructuresError::TrackVis(format!(
            "file too small ({} bytes, header needs {})",
            bytes.len(),
            HEADER_SIZE
        )));
    }
    if &bytes[0..5] != MAGIC {
        return Err(StructuresError::TrackVis(format!(
            "invalid magic {:?}, expected \"TRACK\"",
            String::from_utf8_lossy(&bytes[0..5])
        )));
    }

    if LittleEndian::read_i32(&bytes[996..1000]) == HEADER_SIZE as i32 {
        parse_with_order::<LittleEndian>(bytes)
    } else if BigEndian::read_i32(&bytes[996..1000]) == HEADER_SIZE as i32 {
        parse_with_order::<BigEndian>(bytes)
    } else {
        Err(StructuresError::TrackVis(
            "hdr_size is not 1000 in either byte order".to_string(),
        ))
    }
}

fn read_name_slots(bytes: &[u8], count: usize) -> Vec<String> {
    bytes
        .chunks(NAME_LEN)
        .take(count.min(NAME_SLOTS))
        .map(|slot| {
            let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
            String::from_utf8_lossy(&slot[..end]).into_owned()
        })
        .collect()
}

fn read_f32_array<B: ByteOrder, const N: usize>(bytes: &[u8]) -> [f32; N] {
    let mut out = [0.0; N];
    B::read_f32_into(&bytes[..N * 4], &mut out);
    out
}

fn parse_header<B: ByteOrder>(bytes: &[u8]) -> Result<(TractogramHeader, usize)> {
    let n_scalars = B::read_i16(&bytes[36..38]);
    let n_properties = B::read_i16(&bytes[238..240]);
    if n_scalars < 0 || n_properties < 0 {
        return Err(StructuresError::TrackVis(format!(
            "negative n_scalars ({}) or n_properties ({})",
            n_scalars, n_properties
        )));
    }
    let n_count = B::read_i32(&bytes[988..992]);
    if n_count < 0 {
        return Err(StructuresError::TrackVis(format!(
            "negative n_count ({})",
            n_count
        )));
    }

    let flat: [f32; 16] = read_f32_array::<B, 16>(&bytes[440..504]);
    let mut vox_to_ras = [[0.0; 4]; 4];
    for (row, chunk) in vox_to_ras.iter_mut().zip(flat.chunks(4)) {
        row.copy_from_slice(chunk);
    }

    let mut voxel_order = [0u8; 4];
    voxel_order.copy_from_slice(&bytes[948..952]);

    let header = TractogramHeader {
        dim: [
            B::read_i16(&bytes[6..8]),
            B::read_i16(&bytes[8..10]),
            B::read_i16(&bytes[10..12]),
        ],
        voxel_size: read_f32_array::<B, 3>(&bytes[12..24]),
        origin: read_f32_array::<B, 3>(&bytes[24..36]),
        scalar_names: read_name_slots(&bytes[38..238], n_scalars as usize),
        n_scalars: n_scalars as usize,
        property_names: read_name_slots(&bytes[240..440], n_properties as usize),
        n_properties: n_properties as usize,
        vox_to_ras,
        voxel_order,
        image_orientation_patient: read_f32_array::<B, 6>(&bytes[956..980]),
        invert_x: bytes[982],
        invert_y: bytes[983],
        invert_z: bytes[984],
        swap_xy: bytes[985],
        swap_yz: bytes[986],
        swap_zx: bytes[987],
        version: B::read_i32(&bytes[992..996]),
    };

    Ok((header, n_count as usize))
}

fn body_slice(bytes: &[u8], cursor: usize, len: usize, index: usize) -> Result<&[u8]> {
    bytes
        .get(cursor..cursor + len)
        .ok_or_else(|| StructuresError::TrackVis(format!("streamline {} is truncated", index)))
}

fn parse_with_order<B: ByteOrder>(bytes: &[u8]) -> Result<Tractogram> {
    let (header, n_count) = parse_header::<B>(bytes)?;
    let n_scalars = header.n_scalars;
    let n_properties = header.n_properties;
    let mut tractogram = Tractogram::new(header);

    let mut cursor = HEADER_SIZE;
    let mut values: Vec<f32> = Vec::new();
    let mut points: Vec<Point> = Vec::new();
    let mut scalars: Vec<f32> = Vec::new();

    // n_count == 0 means "unknown": read to end of file
    while cursor < bytes.len() && (n_count == 0 || tractogram.len() < n_count) {
        let index = tractogram.len();
        let n_points = B::read_i32(body_slice(bytes, cursor, 4, index)?);
        cursor += 4;
        if n_points < 0 {
            return Err(StructuresError::TrackVis(format!(
                "streamline {} has negative point count {}",
                index, n_points
            )));
        }
        let n_points = n_points as usize;

        let n_values = n_points * (3 + n_scalars) + n_properties;
        let raw = body_slice(bytes, cursor, n_values * 4, index)?;
        cursor += n_values * 4;

        values.resize(n_values, 0.0);
        B::read_f32_into(raw, &mut values);

        points.clear();
        scalars.clear();
        for record in values[..n_points * (3 + n_scalars)].chunks_exact(3 + n_scalars) {
            points.push([record[0], record[1], record[2]]);
            scalars.extend_from_slice(&record[3..]);
        }
        tractogram.push(&points, &scalars, &values[n_points * (3 + n_scalars)..])?;
    }

    if n_count != 0 && tractogram.len() < n_count {
        return Err(StructuresError::TrackVis(format!(
            "header declares {} streamlines but file holds {}",
            n_count,
            tractogram.len()
        )));
    }

    Ok(tractogram)
}

fn write_name_slots(target: &mut [u8], names: &[String]) {
    for (slot, name) in target.chunks_mut(NAME_LEN).zip(names.iter().take(NAME_SLOTS)) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN - 1);
        slot[..len].copy_from_slice(&bytes[..len]);
    }
}

/// Encode a 1000-byte little-endian header with `n_count` streamlines
pub fn encode_header(header: &TractogramHeader, n_count: usize) -> Result<[u8; HEADER_SIZE]> {
    let as_i16 = |value: usize, field: &str| {
        i16::try_from(value).map_err(|_| {
            StructuresError::TrackVis(format!("{} = {} does not fit in i16", field, value))
        })
    };

    let mut buf = [0u8; HEADER_SIZE];
    buf[0..5].copy_from_slice(MAGIC);
    for (axis, &d) in header.dim.iter().enumerate() {
        LittleEndian::write_i16(&mut buf[6 + axis * 2..8 + axis * 2], d);
    }
    LittleEndian::write_f32_into(&header.voxel_size, &mut buf[12..24]);
    LittleEndian::write_f32_into(&header.origin, &mut buf[24..36]);
    LittleEndian::write_i16(&mut buf[36..38], as_i16(header.n_scalars, "n_scalars")?);
    write_name_slots(&mut buf[38..238], &header.scalar_names);
    LittleEndian::write_i16(&mut buf[238..240], as_i16(header.n_properties, "n_properties")?);
    write_name_slots(&mut buf[240..440], &header.property_names);
    let flat: Vec<f32> = header.vox_to_ras.iter().flatten().copied().collect();
    LittleEndian::write_f32_into(&flat, &mut buf[440..504]);
    buf[948..952].copy_from_slice(&header.voxel_order);
    LittleEndian::write_f32_into(&header.image_orientation_patient, &mut buf[956..980]);
    buf[982..988].copy_from_slice(&[
        header.invert_x,
        header.invert_y,
        header.invert_z,
        header.swap_xy,
        header.swap_yz,
        header.swap_zx,
    ]);
    let n_count = i32::try_from(n_count).map_err(|_| {
        StructuresError::TrackVis(format!("{} streamlines do not fit in n_count", n_count))
    })?;
    LittleEndian::write_i32(&mut buf[988..992], n_count);
    LittleEndian::write_i32(&mut buf[992..996], header.version);
    LittleEndian::write_i32(&mut buf[996..1000], HEADER_SIZE as i32);
    Ok(buf)
}

/// Write a tractogram as little-endian TrackVis to any writer
pub fn write_trackvis_to<W: Write>(writer: &mut W, tractogram: &Tractogram) -> Result<()> {
    let header = encode_header(tractogram.header(), tractogram.len())?;
    writer.write_all(&header)?;

    let n_scalars = tractogram.header().n_scalars;
    for streamline in tractogram.iter() {
        writer.write_i32::<LittleEndian>(streamline.len() as i32)?;
        for (i, point) in streamline.points.iter().enumerate() {
            for &coord in point {
                writer.write_f32::<LittleEndian>(coord)?;
            }
            for &value in &streamline.scalars[i * n_scalars..(i + 1) * n_scalars] {
                writer.write_f32::<LittleEndian>(value)?;
            }
        }
        for &value in streamline.properties {
            writer.write_f32::<LittleEndian>(value)?;
        }
    }
    Ok(())
}

/// Write a `.trk` file
pub fn write_trackvis<P: AsRef<Path>>(path: P, tractogram: &Tractogram) -> Result<()> {
    let path = path.as_ref();
    let mut buffer = Vec::with_capacity(HEADER_SIZE + tractogram.total_points() * 12);
    write_trackvis_to(&mut buffer, tractogram)?;
    fs::write(path, buffer).map_err(|e| StructuresError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tractogram {
        let mut header = TractogramHeader::for_volume([10, 10, 10], [2.0, 2.0, 2.0]);
        header.n_scalars = 1;
        header.scalar_names = vec!["fa".to_string()];
        header.n_properties = 1;
        header.property_names = vec!["weight".to_string()];
        let mut tractogram = Tractogram::new(header);
        tractogram
            .push(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &[0.1, 0.2], &[9.0])
            .unwrap();
        tractogram.push(&[[7.5, 8.5, 9.5]], &[0.3], &[1.5]).unwrap();
        tractogram
    }

    #[test]
    fn test_header_layout() {
        let header = encode_header(sample().header(), 2).unwrap();
        assert_eq!(&header[0..6], b"TRACK\0");
        assert_eq!(LittleEndian::read_i16(&header[6..8]), 10);
        assert_eq!(LittleEndian::read_f32(&header[12..16]), 2.0);
        assert_eq!(LittleEndian::read_i16(&header[36..38]), 1);
        assert_eq!(&header[38..40], b"fa");
        assert_eq!(LittleEndian::read_i32(&header[988..992]), 2);
        assert_eq!(LittleEndian::read_i32(&header[996..1000]), 1000);
    }

    #[test]
    fn test_write_parse_preserves_scalars_and_properties() {
        let original = sample();
        let mut bytes = Vec::new();
        write_trackvis_to(&mut bytes, &original).unwrap();

        let parsed = parse_trackvis(&bytes).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_big_endian_file() {
        let mut header = [0u8; HEADER_SIZE];
        header[0..5].copy_from_slice(MAGIC);
        BigEndian::write_f32_into(&[1.0, 1.0, 1.0], &mut header[12..24]);
        BigEndian::write_i32(&mut header[988..992], 1);
        BigEndian::write_i32(&mut header[996..1000], 1000);

        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&2i32.to_be_bytes());
        for value in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }

        let parsed = parse_trackvis(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.streamline(0).points, &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_unknown_count_reads_to_end() {
        let mut bytes = Vec::new();
        write_trackvis_to(&mut bytes, &sample()).unwrap();
        LittleEndian::write_i32(&mut bytes[988..992], 0);

        assert_eq!(parse_trackvis(&bytes).unwrap().len(), 2);
    }

    #[test]
    fn test_truncated_body_is_error() {
        let mut bytes = Vec::new();
        write_trackvis_to(&mut bytes, &sample()).unwrap();
        bytes.truncate(bytes.len() - 3);

        assert!(matches!(
            parse_trackvis(&bytes),
            Err(StructuresError::TrackVis(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let bytes = vec![0u8; HEADER_SIZE];
        assert!(matches!(
            parse_trackvis(&bytes),
            Err(StructuresError::TrackVis(_))
        ));
    }
}
