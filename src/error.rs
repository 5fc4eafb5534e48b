use thiserror::Error as ThisError;

/// The seven ELF32 header conditions `loader::elf` checks, plus the
/// entry-point-location check, in validation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageErrorKind {
    Magic,
    Class,
    Encoding,
    IdentVersion,
    ObjectType,
    Machine,
    HeaderVersion,
    EntryNotLoaded,
}

impl std::fmt::Display for ImageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImageErrorKind::Magic => "bad ELF magic",
            ImageErrorKind::Class => "not a 32-bit ELF",
            ImageErrorKind::Encoding => "not little-endian",
            ImageErrorKind::IdentVersion => "bad e_ident version",
            ImageErrorKind::ObjectType => "not an executable (ET_EXEC)",
            ImageErrorKind::Machine => "not Intel 80386 (EM_386)",
            ImageErrorKind::HeaderVersion => "bad e_version",
            ImageErrorKind::EntryNotLoaded => "entry point outside loaded segments",
        };
        f.write_str(s)
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("host virtualization error: {0}")]
    Host(#[from] kvm_ioctls::Error),

    #[error("unsupported KVM API version: got {got}, want {want}")]
    VersionMismatch { got: i32, want: i32 },

    #[error("failed to allocate guest memory")]
    OutOfMemory,

    #[error("write past the end of guest memory")]
    OutOfBounds,

    #[error("invalid guest image: {0}")]
    InvalidImage(ImageErrorKind),

    #[error("PT_LOAD segment {0} exceeds guest memory")]
    SegmentOutOfBounds(usize),

    #[error("initrd overlaps the kernel image")]
    InitrdOverlap,

    #[error("initrd does not fit in guest memory")]
    InitrdTooLarge,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected vCPU exit: {0}")]
    UnexpectedExit(String),
}

pub type Result<T> = std::result::Result<T, Error>;
