//! Test fixture builders for ZiPatch byte streams

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use sqpatch_core::zipatch::{SqpackFileRef, SqpkCompressedBlock, ZIPATCH_MAGIC};

/// Build a complete chunk with size prefix and CRC32 suffix
/// Format: [size: u32 BE][type: 4 ASCII][data: N bytes][crc32: u32 BE]
/// Where size = N (data bytes only, NOT including type)
pub fn build_chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::new();
    chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
    chunk.extend_from_slice(chunk_type);
    chunk.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    chunk.extend_from_slice(&hasher.finalize().to_be_bytes());

    chunk
}

pub fn build_fhdr_chunk() -> Vec<u8> {
    build_fhdr_chunk_version(3)
}

/// FHDR with the given version byte, DIFF type and 10 entry files
pub fn build_fhdr_chunk_version(version: u8) -> Vec<u8> {
    let mut data = vec![0, 0, version, 0];
    data.extend_from_slice(b"DIFF");
    data.extend_from_slice(&10u32.to_be_bytes());
    if version == 3 {
        let fields: [u32; 12] = [1, 0, 1, 2, 0, 0x1234, 0, 0, 0, 0, 0, 7];
        for field in fields {
            data.extend_from_slice(&field.to_be_bytes());
        }
    }
    // trailing reserved area
    data.extend_from_slice(&[0u8; 8]);
    build_chunk(b"FHDR", &data)
}

pub fn build_aply_chunk(option: u32, value: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&option.to_be_bytes());
    data.extend_from_slice(&[0u8; 4]);
    data.extend_from_slice(&value.to_be_bytes());
    build_chunk(b"APLY", &data)
}

/// ADIR or DELD chunk
pub fn build_dir_chunk(tag: &[u8; 4], path: &str) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&(path.len() as u32).to_be_bytes());
    data.extend_from_slice(path.as_bytes());
    build_chunk(tag, &data)
}

pub fn build_eof_chunk() -> Vec<u8> {
    build_chunk(b"EOF_", &[])
}

/// SQPK chunk around an already encoded command body
pub fn build_sqpk_chunk(command: u8, body: &[u8]) -> Vec<u8> {
    let inner_size = (5 + body.len()) as i32;
    let mut data = Vec::new();
    data.extend_from_slice(&inner_size.to_be_bytes());
    data.push(command);
    data.extend_from_slice(body);
    build_chunk(b"SQPK", &data)
}

fn push_file_ref(body: &mut Vec<u8>, target: SqpackFileRef) {
    body.extend_from_slice(&target.main_id.to_be_bytes());
    body.extend_from_slice(&target.sub_id.to_be_bytes());
    body.extend_from_slice(&target.file_id.to_be_bytes());
}

/// SQPK `A`; `payload` length must be a multiple of 128
pub fn build_sqpk_add_chunk(
    target: SqpackFileRef,
    offset_blocks: u32,
    payload: &[u8],
    delete_blocks: u32,
) -> Vec<u8> {
    assert_eq!(payload.len() % 128, 0);
    let mut body = vec![0u8; 3];
    push_file_ref(&mut body, target);
    body.extend_from_slice(&offset_blocks.to_be_bytes());
    body.extend_from_slice(&((payload.len() / 128) as u32).to_be_bytes());
    body.extend_from_slice(&delete_blocks.to_be_bytes());
    body.extend_from_slice(payload);
    build_sqpk_chunk(b'A', &body)
}

/// SQPK `D` or `E`
pub fn build_sqpk_range_chunk(
    command: u8,
    target: SqpackFileRef,
    offset_blocks: u32,
    block_count: u32,
) -> Vec<u8> {
    let mut body = vec![0u8; 3];
    push_file_ref(&mut body, target);
    body.extend_from_slice(&offset_blocks.to_be_bytes());
    body.extend_from_slice(&block_count.to_be_bytes());
    body.extend_from_slice(&[0u8; 4]);
    build_sqpk_chunk(command, &body)
}

/// SQPK `H` with 1024 bytes of `fill`
pub fn build_sqpk_header_chunk(
    file_kind: u8,
    header_kind: u8,
    target: SqpackFileRef,
    fill: u8,
) -> Vec<u8> {
    let mut body = vec![file_kind, header_kind, 0];
    push_file_ref(&mut body, target);
    body.extend_from_slice(&[fill; 1024]);
    build_sqpk_chunk(b'H', &body)
}

/// SQPK `F` for any operation; `blocks` pairs data with whether to deflate it
pub fn build_sqpk_file_chunk(
    operation: u8,
    path: &str,
    file_offset: i64,
    expansion_id: u16,
    blocks: &[(&[u8], bool)],
) -> Vec<u8> {
    let file_size: usize = blocks.iter().map(|(data, _)| data.len()).sum();
    let mut body = vec![operation, 0, 0];
    body.extend_from_slice(&file_offset.to_be_bytes());
    body.extend_from_slice(&(file_size as u64).to_be_bytes());
    body.extend_from_slice(&(path.len() as u32).to_be_bytes());
    body.extend_from_slice(&expansion_id.to_be_bytes());
    body.extend_from_slice(&[0u8; 2]);
    body.extend_from_slice(path.as_bytes());

    for (data, compress) in blocks {
        let (compressed_size, stored) = if *compress {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            let deflated = encoder.finish().unwrap();
            (deflated.len() as i32, deflated)
        } else {
            (32000, data.to_vec())
        };
        let block_len =
            SqpkCompressedBlock::aligned_length(compressed_size, data.len() as i32) as usize;

        body.extend_from_slice(&16i32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&compressed_size.to_le_bytes());
        body.extend_from_slice(&(data.len() as i32).to_le_bytes());
        body.extend_from_slice(&stored);
        body.extend(std::iter::repeat(0u8).take(block_len - 16 - stored.len()));
    }

    build_sqpk_chunk(b'F', &body)
}

pub fn build_sqpk_file_add_chunk(path: &str, file_offset: i64, blocks: &[(&[u8], bool)]) -> Vec<u8> {
    build_sqpk_file_chunk(b'A', path, file_offset, 0, blocks)
}

pub fn build_sqpk_target_info_chunk(platform: u16) -> Vec<u8> {
    let mut body = vec![0u8; 3];
    body.extend_from_slice(&platform.to_be_bytes());
    body.extend_from_slice(&(-1i16).to_be_bytes());
    body.extend_from_slice(&0i16.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&0x10u64.to_le_bytes());
    body.extend_from_slice(&0x20u64.to_le_bytes());
    build_sqpk_chunk(b'T', &body)
}

/// Magic header followed by the given chunks
pub fn build_patch(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut patch = ZIPATCH_MAGIC.to_vec();
    for chunk in chunks {
        patch.extend_from_slice(chunk);
    }
    patch
}

pub fn create_temp_patch(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}
