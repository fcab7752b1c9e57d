pub(crate) mod mp4;
