use rand::Rng;

/// Lowercase DNS-1123 safe alphabet for resource name suffixes.
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub const BINDING_SUFFIX_LEN: usize = 6;
pub const SECRET_SUFFIX_LEN: usize = 5;

pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

pub fn binding_name(prefix: &str) -> String {
    format!("{prefix}{}", random_suffix(BINDING_SUFFIX_LEN))
}

pub fn secret_name(prefix: &str) -> String {
    format!("{prefix}{}", random_suffix(SECRET_SUFFIX_LEN))
}
