//! Chunk decoders
//!
//! One function per chunk tag and per SQPK command. Every decoder reads
//! through the [`ChecksumReader`], and [`read_chunk`] pads whatever a decoder
//! left unread so the stream always lands on the trailing CRC32.

use std::io::Read;

use sqpatch_core::error::Error;
use sqpatch_core::zipatch::*;

use super::checksum::ChecksumReader;

/// Bytes of SQPK framing counted by the inner size (size field + command byte)
const SQPK_FRAME_SIZE: i32 = 5;

/// Decode one framed chunk: size, tag, payload, padding and stored CRC32.
///
/// The CRC is recomputed while reading; comparing it with the stored value is
/// left to the caller.
pub fn read_chunk<R: Read>(reader: &mut ChecksumReader<R>) -> Result<ChunkFrame, Error> {
    let offset = reader.position();
    let size = reader.u32_be()?;

    reader.reset_checksum();
    let tag_bytes = reader.array::<4>()?;
    let tag = String::from_utf8_lossy(&tag_bytes).to_string();

    let payload_start = reader.position();
    let payload_end = payload_start + size as u64;

    let chunk = match &tag_bytes {
        b"FHDR" => read_file_header(reader)?,
        b"APLY" => read_apply_option(reader)?,
        b"ADIR" => ZiPatchChunk::AddDirectory(read_directory(reader)?),
        b"DELD" => ZiPatchChunk::DeleteDirectory(read_directory(reader)?),
        b"APFS" => ZiPatchChunk::ApplyFreeSpace(ApplyFreeSpaceChunk {
            unknown_a: reader.i64_be()?,
            unknown_b: reader.i64_be()?,
        }),
        b"SQPK" => ZiPatchChunk::Sqpk(read_sqpk(reader, size, payload_end)?),
        b"XXXX" => ZiPatchChunk::Passthrough { size },
        b"EOF_" => ZiPatchChunk::EndOfFile,
        _ => return Err(Error::UnknownChunkType(tag)),
    };

    let consumed = reader.position() - payload_start;
    if consumed > size as u64 {
        return Err(Error::ChunkSizeMismatch {
            tag,
            offset,
            declared: size,
            consumed,
        });
    }
    reader.skip(size as u64 - consumed)?;

    let computed_checksum = reader.checksum();
    let checksum = reader.u32_be()?;

    Ok(ChunkFrame {
        offset,
        size,
        checksum,
        computed_checksum,
        chunk,
    })
}

fn read_file_header<R: Read>(reader: &mut ChecksumReader<R>) -> Result<ZiPatchChunk, Error> {
    let version = reader.array::<4>()?[2];
    let patch_type = reader.fixed_string(4)?;
    let entry_files = reader.u32_be()?;

    let v3 = if version == SUPPORTED_PATCH_VERSION {
        let add_directories = reader.u32_be()?;
        let delete_directories = reader.u32_be()?;
        let low = reader.u32_be()? as u64;
        let high = reader.u32_be()? as u64;
        Some(FileHeaderV3 {
            add_directories,
            delete_directories,
            delete_data_size: low | (high << 32),
            minor_version: reader.u32_be()?,
            repository_name: reader.u32_be()?,
            commands: reader.u32_be()?,
            sqpk_add_commands: reader.u32_be()?,
            sqpk_delete_commands: reader.u32_be()?,
            sqpk_expand_commands: reader.u32_be()?,
            sqpk_header_commands: reader.u32_be()?,
            sqpk_file_commands: reader.u32_be()?,
        })
    } else {
        None
    };

    Ok(ZiPatchChunk::FileHeader(FileHeaderChunk {
        version,
        patch_type,
        entry_files,
        v3,
    }))
}

fn read_apply_option<R: Read>(reader: &mut ChecksumReader<R>) -> Result<ZiPatchChunk, Error> {
    let option = ApplyOption::from(reader.u32_be()?);
    reader.skip(4)?;
    let value = reader.u32_be()? != 0;
    Ok(ZiPatchChunk::ApplyOption(ApplyOptionChunk { option, value }))
}

fn read_directory<R: Read>(reader: &mut ChecksumReader<R>) -> Result<DirectoryChunk, Error> {
    let len = reader.u32_be()?;
    let path = reader.fixed_string(len as u64)?;
    Ok(DirectoryChunk { path })
}

fn read_file_ref<R: Read>(reader: &mut ChecksumReader<R>) -> Result<SqpackFileRef, Error> {
    Ok(SqpackFileRef {
        main_id: reader.u16_be()?,
        sub_id: reader.u16_be()?,
        file_id: reader.u32_be()?,
    })
}

/// Block counts are stored as 128-byte units
fn read_blocks<R: Read>(reader: &mut ChecksumReader<R>) -> Result<u64, Error> {
    Ok((reader.u32_be()? as u64) << SQPACK_BLOCK_SHIFT)
}

fn read_sqpk<R: Read>(
    reader: &mut ChecksumReader<R>,
    outer_size: u32,
    payload_end: u64,
) -> Result<SqpkCommand, Error> {
    let inner_size = reader.i32_be()?;
    if inner_size < SQPK_FRAME_SIZE || inner_size as u32 != outer_size {
        return Err(Error::SqpkSizeMismatch {
            inner: inner_size,
            outer: outer_size,
        });
    }

    let command = reader.u8()?;
    match command {
        SqpkCommand::ADD_DATA => read_add_data(reader).map(SqpkCommand::AddData),
        SqpkCommand::DELETE_DATA => read_block_range(reader).map(SqpkCommand::DeleteData),
        SqpkCommand::EXPAND_DATA => read_block_range(reader).map(SqpkCommand::ExpandData),
        SqpkCommand::HEADER => read_header(reader).map(SqpkCommand::Header),
        SqpkCommand::FILE => read_file(reader, payload_end).map(SqpkCommand::File),
        SqpkCommand::INDEX => read_index(reader).map(SqpkCommand::Index),
        SqpkCommand::PATCH_INFO => read_patch_info(reader).map(SqpkCommand::PatchInfo),
        SqpkCommand::TARGET_INFO => read_target_info(reader).map(SqpkCommand::TargetInfo),
        other => Err(Error::UnknownSqpkCommand(other as char)),
    }
}

fn read_add_data<R: Read>(reader: &mut ChecksumReader<R>) -> Result<SqpkAddData, Error> {
    reader.skip(3)?;
    let target_file = read_file_ref(reader)?;
    let block_offset = read_blocks(reader)?;
    let block_number = read_blocks(reader)?;
    let block_delete_number = read_blocks(reader)?;

    let data_source_offset = reader.position();
    let block_data = reader.read_bytes(block_number)?;

    Ok(SqpkAddData {
        target_file,
        block_offset,
        block_number,
        block_delete_number,
        block_data,
        data_source_offset,
    })
}

fn read_block_range<R: Read>(reader: &mut ChecksumReader<R>) -> Result<SqpkBlockRange, Error> {
    reader.skip(3)?;
    let target_file = read_file_ref(reader)?;
    let block_offset = read_blocks(reader)?;
    let block_count = reader.u32_be()?;
    reader.skip(4)?;

    Ok(SqpkBlockRange {
        target_file,
        block_offset,
        block_count,
    })
}

fn read_header<R: Read>(reader: &mut ChecksumReader<R>) -> Result<SqpkHeader, Error> {
    let file_byte = reader.u8()?;
    let header_byte = reader.u8()?;
    reader.skip(1)?;

    let file_kind = SqpackFileKind::from_byte(file_byte)
        .ok_or(Error::UnknownSqpackFileKind(file_byte as char))?;
    let header_kind = SqpkHeaderKind::from_byte(header_byte)
        .ok_or(Error::UnknownSqpkHeaderKind(header_byte as char))?;

    let target_file = read_file_ref(reader)?;
    let data_source_offset = reader.position();
    let header_data = reader.read_bytes(SQPACK_HEADER_SIZE)?;

    Ok(SqpkHeader {
        file_kind,
        header_kind,
        target_file,
        header_data,
        data_source_offset,
    })
}

fn read_file<R: Read>(
    reader: &mut ChecksumReader<R>,
    payload_end: u64,
) -> Result<SqpkFile, Error> {
    let op_byte = reader.u8()?;
    let operation = SqpkFileOperation::from_byte(op_byte)
        .ok_or(Error::UnknownSqpkFileOperation(op_byte as char))?;
    reader.skip(2)?;
    let file_offset = reader.i64_be()?;
    let file_size = reader.u64_be()?;
    let path_len = reader.u32_be()?;
    let expansion_id = reader.u16_be()?;
    reader.skip(2)?;
    let path = reader.fixed_string(path_len as u64)?;

    let mut blocks = Vec::new();
    if operation == SqpkFileOperation::AddFile {
        while reader.position() < payload_end {
            blocks.push(read_compressed_block(reader)?);
        }
    }

    Ok(SqpkFile {
        operation,
        file_offset,
        file_size,
        expansion_id,
        path,
        blocks,
    })
}

fn read_compressed_block<R: Read>(
    reader: &mut ChecksumReader<R>,
) -> Result<SqpkCompressedBlock, Error> {
    let header_size = reader.i32_le()?;
    reader.skip(4)?;
    let compressed_size = reader.i32_le()?;
    let decompressed_size = reader.i32_le()?;

    let block_length = SqpkCompressedBlock::aligned_length(compressed_size, decompressed_size);
    let body_length = block_length.saturating_sub(header_size.max(0) as u64);

    let data = if compressed_size != UNCOMPRESSED_BLOCK_MARKER {
        reader.read_bytes(body_length)?
    } else {
        let stored = decompressed_size.max(0) as u64;
        let data = reader.read_bytes(stored)?;
        reader.skip(body_length.saturating_sub(stored))?;
        data
    };

    Ok(SqpkCompressedBlock {
        header_size,
        compressed_size,
        decompressed_size,
        data,
    })
}

fn read_index<R: Read>(reader: &mut ChecksumReader<R>) -> Result<SqpkIndex, Error> {
    let command = SqpkIndexCommand::from(reader.u8()?);
    let is_synonym = reader.u8()? != 0;
    reader.skip(1)?;

    Ok(SqpkIndex {
        command,
        is_synonym,
        target_file: read_file_ref(reader)?,
        file_hash: reader.u64_be()?,
        block_offset: reader.u32_be()?,
        block_number: reader.u32_be()?,
    })
}

fn read_patch_info<R: Read>(reader: &mut ChecksumReader<R>) -> Result<SqpkPatchInfo, Error> {
    let status = reader.u8()?;
    let version = reader.u8()?;
    reader.skip(1)?;

    Ok(SqpkPatchInfo {
        status,
        version,
        install_size: reader.u64_be()?,
    })
}

fn read_target_info<R: Read>(reader: &mut ChecksumReader<R>) -> Result<SqpkTargetInfo, Error> {
    reader.skip(3)?;

    Ok(SqpkTargetInfo {
        platform: Platform::from(reader.u16_be()?),
        region: reader.i16_be()?,
        is_debug: reader.i16_be()? != 0,
        version: reader.u16_be()?,
        deleted_data_size: reader.u64_le()?,
        seek_count: reader.u64_le()?,
    })
}
