//! Engine-wide constants, grounded in `original_source/common/Config.hpp`.

/// Size of a page in bytes. The on-disk format is bit-exact with the
/// original source, which fixes this at 8 KiB (not the 4 KiB some storage
/// engines default to).
pub const PAGE_SIZE: usize = 8192;

/// Bits per `u32` word, used throughout the bit-packing helpers.
pub const BITS_PER_WORD: u32 = 32;

/// Bytes per `u32` word.
pub const BYTES_PER_WORD: usize = 4;

/// Number of `u32` words per page.
pub const WORDS_PER_PAGE: usize = PAGE_SIZE / BYTES_PER_WORD;

/// Buffer pool capacity, in frames (~48 MiB at 8 KiB/frame).
pub const CACHE_CAPACITY: usize = 6000;

/// Bytes of the 80-byte per-column metadata block (schema header).
pub const RECORD_META_DATA_LENGTH: usize = 80;

/// Bytes of the fixed head of the record schema header, before the
/// per-column metadata blocks begin.
pub const RECORD_META_DATA_HEAD: usize = 32;

/// Maximum number of columns a table schema can declare.
pub const MAX_COLUMN_NUM: usize = 102;

/// Bytes of the heap page's slot-occupancy bitmap header.
pub const RECORD_PAGE_HEADER: usize = 64;

/// Upper bound on slots per heap page, regardless of how small a slot is.
pub const MAX_ITEM_PER_PAGE: usize = 512;

/// Bytes of the B+ tree node header (`prev/next/child_count/is_leaf`).
pub const INDEX_HEADER_BYTE_LEN: usize = 16;

/// Bytes of bit-addressable space per index allocation bitmap page
/// (the remaining 4 bytes at the page tail hold the "next bitmap page" link).
pub const INDEX_BITMAP_PAGE_BYTE_LEN: usize = 8188;

/// Maximum declared columns in a foreign key.
pub const FOREIGN_KEY_MAX_NUM: usize = 10;

/// Maximum declared columns in an index key.
pub const INDEX_KEY_MAX_NUM: usize = 10;

/// Capacity of the RecordManager's / IndexManager's open-file LRU caches.
pub const FILE_CACHE_CAPACITY: usize = 10;

/// Suffix appended to index names created implicitly by `add_unique`.
pub const UNIQUE_SUFFIX: &str = "_UNIQUE";

/// Sentinel used both as "no value" and as the encoding of NULL within a
/// B+ tree key tuple.
pub const INT_MIN: i32 = i32::MIN;
pub const INT_MAX: i32 = i32::MAX;
pub const FLOAT_MAX: f64 = f64::MAX;

// On-disk path layout (§6). These are relative to the process working
// directory, matching the `./data/...` convention.
pub const DATA_ROOT: &str = "./data";
pub const GLOBAL_DIR: &str = "./data/global";
pub const BASE_DIR: &str = "./data/base";
pub const GLOBAL_DATABASE_FILE: &str = "ALLDatabase";
pub const DB_DIR_PREFIX: &str = "DB";
pub const TB_DIR_PREFIX: &str = "TB";
pub const ALL_TABLE_FILE: &str = "ALLTable";
pub const RECORD_FILE_NAME: &str = "Record";
pub const PRIMARY_KEY_FILE_NAME: &str = "PrimaryKey";
pub const FOREIGN_KEY_FILE_NAME: &str = "ForeignKey";
pub const DOMINATE_FILE_NAME: &str = "Dominate";
pub const INDEX_INFO_FILE_NAME: &str = "IndexInfo";
pub const INDEX_FILES_DIR: &str = "IndexFiles";
pub const INDEX_FILE_PREFIX: &str = "INDEX";
pub const TMP_FILE_PREFIX: &str = "tmp";
