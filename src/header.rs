//! The fixed 400-byte preamble at offset 0 of every DAT file.
//!
//! The preamble starts with two opaque blobs (version and transaction log)
//! followed by the structural fields the reader needs: block size, declared
//! file size and the offset of the directory root.  The free-list and LRU
//! fields are decoded for display only; a reader never acts on them.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};

use crate::error::{DatError, Result};

pub const HEADER_SIZE: usize = 400;
pub const DAT_MAGIC: u32 = 0x0000_5442;

const VERSION_LEN: usize = 256;
const TRANSACTIONS_LEN: usize = 64;
const MAJOR_VERSION_LEN: usize = 16;

/// Which logical database a DAT file holds.  All four share the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    Portal,
    Cell,
    Language,
    Unknown(u32),
}

impl From<u32> for DatabaseType {
    fn from(v: u32) -> Self {
        match v {
            1 => DatabaseType::Portal,
            2 => DatabaseType::Cell,
            3 => DatabaseType::Language,
            other => DatabaseType::Unknown(other),
        }
    }
}

impl From<DatabaseType> for u32 {
    fn from(t: DatabaseType) -> u32 {
        match t {
            DatabaseType::Portal => 1,
            DatabaseType::Cell => 2,
            DatabaseType::Language => 3,
            DatabaseType::Unknown(v) => v,
        }
    }
}

/// Database variant after taking the subset into account.  HighRes files are
/// Portal databases with a nonzero subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Portal,
    HighRes,
    Cell,
    Language,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: Vec<u8>,
    pub transactions: Vec<u8>,
    pub magic: u32,
    pub block_size: u32,
    pub file_size: u32,
    pub database_type: DatabaseType,
    pub subset: u32,
    pub first_free_block: u32,
    pub last_free_block: u32,
    pub free_block_count: u32,
    pub root_block: u32,
    pub new_lru: u32,
    pub old_lru: u32,
    pub use_lru: u32,
    pub master_map_id: u32,
    pub engine_version: u32,
    pub game_version: u32,
    pub major_version: [u8; MAJOR_VERSION_LEN],
    pub minor_version: u32,
}

impl Header {
    /// A structurally valid header with zeroed diagnostic fields.
    pub fn new(database_type: DatabaseType, block_size: u32, file_size: u32, root_block: u32) -> Self {
        Self {
            version: vec![0u8; VERSION_LEN],
            transactions: vec![0u8; TRANSACTIONS_LEN],
            magic: DAT_MAGIC,
            block_size,
            file_size,
            database_type,
            subset: 0,
            first_free_block: 0,
            last_free_block: 0,
            free_block_count: 0,
            root_block,
            new_lru: 0,
            old_lru: 0,
            use_lru: 0,
            master_map_id: 0,
            engine_version: 0,
            game_version: 0,
            major_version: [0u8; MAJOR_VERSION_LEN],
            minor_version: 0,
        }
    }

    /// Decode and validate the preamble.  Pure: no I/O beyond the slice.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_SIZE {
            return Err(DatError::header(format!(
                "need {HEADER_SIZE} bytes, got {}",
                raw.len()
            )));
        }
        let header = Self::read(&raw[..HEADER_SIZE])
            .map_err(|e| DatError::header(e.to_string()))?;
        header.validate()?;
        Ok(header)
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut version = vec![0u8; VERSION_LEN];
        reader.read_exact(&mut version)?;
        let mut transactions = vec![0u8; TRANSACTIONS_LEN];
        reader.read_exact(&mut transactions)?;

        let magic = reader.read_u32::<LittleEndian>()?;
        let block_size = reader.read_i32::<LittleEndian>()?;
        let file_size = reader.read_i32::<LittleEndian>()?;
        let database_type = DatabaseType::from(reader.read_u32::<LittleEndian>()?);
        let subset = reader.read_u32::<LittleEndian>()?;
        let first_free_block = reader.read_u32::<LittleEndian>()?;
        let last_free_block = reader.read_u32::<LittleEndian>()?;
        let free_block_count = reader.read_u32::<LittleEndian>()?;
        let root_block = reader.read_u32::<LittleEndian>()?;
        let new_lru = reader.read_u32::<LittleEndian>()?;
        let old_lru = reader.read_u32::<LittleEndian>()?;
        let use_lru = reader.read_u32::<LittleEndian>()?;
        let master_map_id = reader.read_u32::<LittleEndian>()?;
        let engine_version = reader.read_u32::<LittleEndian>()?;
        let game_version = reader.read_u32::<LittleEndian>()?;
        let mut major_version = [0u8; MAJOR_VERSION_LEN];
        reader.read_exact(&mut major_version)?;
        let minor_version = reader.read_u32::<LittleEndian>()?;

        // Signed on disk; negative sizes fail validation below.
        let block_size = if block_size <= 0 { 0 } else { block_size as u32 };
        let file_size = if file_size < 0 { 0 } else { file_size as u32 };

        Ok(Self {
            version,
            transactions,
            magic,
            block_size,
            file_size,
            database_type,
            subset,
            first_free_block,
            last_free_block,
            free_block_count,
            root_block,
            new_lru,
            old_lru,
            use_lru,
            master_map_id,
            engine_version,
            game_version,
            major_version,
            minor_version,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut version = self.version.clone();
        version.resize(VERSION_LEN, 0);
        writer.write_all(&version)?;
        let mut transactions = self.transactions.clone();
        transactions.resize(TRANSACTIONS_LEN, 0);
        writer.write_all(&transactions)?;

        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.block_size)?;
        writer.write_u32::<LittleEndian>(self.file_size)?;
        writer.write_u32::<LittleEndian>(self.database_type.into())?;
        writer.write_u32::<LittleEndian>(self.subset)?;
        writer.write_u32::<LittleEndian>(self.first_free_block)?;
        writer.write_u32::<LittleEndian>(self.last_free_block)?;
        writer.write_u32::<LittleEndian>(self.free_block_count)?;
        writer.write_u32::<LittleEndian>(self.root_block)?;
        writer.write_u32::<LittleEndian>(self.new_lru)?;
        writer.write_u32::<LittleEndian>(self.old_lru)?;
        writer.write_u32::<LittleEndian>(self.use_lru)?;
        writer.write_u32::<LittleEndian>(self.master_map_id)?;
        writer.write_u32::<LittleEndian>(self.engine_version)?;
        writer.write_u32::<LittleEndian>(self.game_version)?;
        writer.write_all(&self.major_version)?;
        writer.write_u32::<LittleEndian>(self.minor_version)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.magic != DAT_MAGIC {
            return Err(DatError::header(format!(
                "bad magic {:#010x}, expected {DAT_MAGIC:#010x}",
                self.magic
            )));
        }
        if self.block_size == 0 {
            return Err(DatError::header("block size must be positive"));
        }
        if !self.block_size.is_power_of_two() || self.block_size <= 4 {
            return Err(DatError::header(format!(
                "unsupported block size {}",
                self.block_size
            )));
        }
        let region = self.header_region();
        if (self.file_size as u64) < region {
            return Err(DatError::header(format!(
                "file size {} smaller than header region {region}",
                self.file_size
            )));
        }
        let root = self.root_block as u64;
        if root % self.block_size as u64 != 0
            || root < region
            || root + self.block_size as u64 > self.file_size as u64
        {
            return Err(DatError::header(format!(
                "root block {:#010x} outside file bounds",
                self.root_block
            )));
        }
        Ok(())
    }

    /// Bytes reserved for the preamble, padded up to whole blocks.
    pub fn header_region(&self) -> u64 {
        let bs = self.block_size.max(1) as u64;
        (HEADER_SIZE as u64).div_ceil(bs) * bs
    }

    pub fn kind(&self) -> DatabaseKind {
        match self.database_type {
            DatabaseType::Portal if self.subset != 0 => DatabaseKind::HighRes,
            DatabaseType::Portal => DatabaseKind::Portal,
            DatabaseType::Cell => DatabaseKind::Cell,
            DatabaseType::Language => DatabaseKind::Language,
            DatabaseType::Unknown(_) => DatabaseKind::Unknown,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Database Header:")?;
        writeln!(f, "  Version          {}", hex::encode(&self.version))?;
        writeln!(f, "  Transactions     {}", hex::encode(&self.transactions))?;
        writeln!(f, "  Magic            {:08X}", self.magic)?;
        writeln!(f, "  BlockSize        {}", self.block_size)?;
        writeln!(f, "  FileSize         {}", self.file_size)?;
        writeln!(f, "  Type             {:?} ({:?})", self.database_type, self.kind())?;
        writeln!(f, "  SubSet           {}", self.subset)?;
        writeln!(f, "  FirstFreeBlock   {:08X}", self.first_free_block)?;
        writeln!(f, "  LastFreeBlock    {:08X}", self.last_free_block)?;
        writeln!(f, "  FreeBlockCount   {}", self.free_block_count)?;
        writeln!(f, "  RootBlock        {:08X}", self.root_block)?;
        writeln!(f, "  NewLRU           {}", self.new_lru)?;
        writeln!(f, "  OldLRU           {}", self.old_lru)?;
        writeln!(f, "  UseLRU           {}", self.use_lru)?;
        writeln!(f, "  MasterMapId      {:08X}", self.master_map_id)?;
        writeln!(f, "  EngineVersion    {}", self.engine_version)?;
        writeln!(f, "  GameVersion      {}", self.game_version)?;
        writeln!(f, "  MajorVersion     {}", hex::encode(self.major_version))?;
        write!(f, "  MinorVersion     {}", self.minor_version)
    }
}
