pub(crate) const MAX_BUFFER_BYTES: usize = 1024 * 1024; // ~1 MiB cap for history ring
pub(crate) const PTY_ROWS: u16 = 40;
pub(crate) const PTY_COLS: u16 = 120;
pub(crate) const PASTE_BEGIN: &[u8] = b"\x1b[200~";
pub(crate) const PASTE_END: &[u8] = b"\x1b[201~";
