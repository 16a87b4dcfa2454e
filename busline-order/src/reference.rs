use rand::Rng;

// No 0/O or 1/I, references get read out over the phone
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const LENGTH: usize = 8;

/// Human-shareable booking reference, `BL-XXXXXXXX`
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("BL-{}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let reference = generate();

        assert_eq!(reference.len(), 11);
        assert!(reference.starts_with("BL-"));
        assert!(reference[3..].bytes().all(|b| ALPHABET.contains(&b)));
    }
}
