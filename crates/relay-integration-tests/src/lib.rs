//! Nothing lives here; this crate exists to host `tests/`.
