/// Structural identity of a component call site.
///
/// `id` is fixed per call site (usually mixed with the current position hash)
/// and `iter` tells apart instances created by the same call site inside a
/// loop. The discriminator kind takes part in equality: `Int(0)`, `Uint(0)`
/// and `Str("0")` are three different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompKey {
    pub id: u64,
    pub iter: IterKey,
}

impl CompKey {
    pub fn new(id: u64, iter: impl Into<IterKey>) -> Self {
        Self {
            id,
            iter: iter.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IterKey {
    None,
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    Str(String),
}

impl Default for IterKey {
    fn default() -> Self {
        IterKey::None
    }
}

macro_rules! iter_key_from {
    ($($t:ty => $variant:ident),*) => {
        $(impl From<$t> for IterKey {
            fn from(v: $t) -> Self {
                IterKey::$variant(v)
            }
        })*
    };
}

iter_key_from!(
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    String => Str
);

impl From<&str> for IterKey {
    fn from(v: &str) -> Self {
        IterKey::Str(v.to_string())
    }
}

impl From<()> for IterKey {
    fn from(_: ()) -> Self {
        IterKey::None
    }
}

/// Build a call-site id from a unix timestamp and 32 bits of extra data.
pub fn make_comp_key_id(unix_secs: u32, data: u32) -> u64 {
    (u64::from(unix_secs) << 32) | u64::from(data)
}
