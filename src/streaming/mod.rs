//! Stone persistence: codec, async file I/O and the background worker

pub mod disk_io;
pub mod worker;

pub use disk_io::{
    CodecError, SaveFormat,
    save, save_as, load, load_into,
    encode_text, decode_binary, decode_text,
    save_stone, load_stone, stone_exists,
};
pub use worker::{PersistenceRequest, PersistenceResult, PersistenceWorker};
