pub(crate) mod aac;
pub(crate) mod adts;
pub(crate) mod annexb;
pub(crate) mod chunk;
pub(crate) mod h264;
