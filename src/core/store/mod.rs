mod data_io;
mod directory;
mod fs_directory;
mod index_io;
mod ram_directory;
mod tracking_directory;

pub use self::data_io::{read_vint_from, write_vint_to, DataInput, DataOutput};
pub use self::directory::{
    open_checksum_input, Directory, DirectoryRc, FlushInfo, IOContext, Lock, IO_CONTEXT_READONCE,
};
pub use self::fs_directory::FSDirectory;
pub use self::index_io::{
    ByteArrayIndexInput, ChecksumIndexInput, IndexInput, IndexOutput, RAMOutputStream,
};
pub use self::ram_directory::RAMDirectory;
pub use self::tracking_directory::TrackingDirectoryWrapper;
