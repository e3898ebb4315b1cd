//! Rad50 packing and the 6.3 filename parser.
//!
//! Rad50 packs three characters of a 40-symbol alphabet into one 16-bit
//! word: `c0*40^2 + c1*40 + c2`. A filename occupies three words — six
//! basename characters and three extension characters, space padded.
//! Lowercase is not encodable.

const CHARSET: &[u8; 40] = b" ABCDEFGHIJKLMNOPQRSTUVWXYZ$.%0123456789";
const BASE: u16 = 40;

/// A filename as stored on disk: three packed Rad50 words.
pub type Rad50Name = [u16; 3];

/// Decode one Rad50 word into its three characters.
///
/// Words above the encodable range (`40^3 - 1`) still decode; the leading
/// ordinal is reduced modulo the alphabet, matching how RT-11 tools behave
/// on garbage words.
#[must_use]
pub fn from_rad50(word: u16) -> [char; 3] {
    let c0 = CHARSET[(word / (BASE * BASE)) as usize % 40] as char;
    let c1 = CHARSET[((word / BASE) % BASE) as usize] as char;
    let c2 = CHARSET[(word % BASE) as usize] as char;
    [c0, c1, c2]
}

/// Encode exactly three characters into a Rad50 word.
///
/// Returns `None` if the input is not exactly three characters or any
/// character is outside the Rad50 alphabet.
#[must_use]
pub fn to_rad50(triple: &str) -> Option<u16> {
    let mut chars = triple.chars();
    let mut word = 0_u16;
    for _ in 0..3 {
        let ch = chars.next()?;
        let ordinal = CHARSET.iter().position(|&c| c as char == ch)?;
        word = word * BASE + ordinal as u16;
    }
    if chars.next().is_some() {
        return None;
    }
    Some(word)
}

/// Parse a printable filename into its on-disk Rad50 form.
///
/// The basename may hold one to six Rad50 characters, optionally followed
/// by a dot and a zero-to-three character extension. The filesystem is
/// case sensitive and lowercase letters do not exist in the alphabet, so
/// lowercase names fail to parse.
#[must_use]
pub fn parse_filename(name: &str) -> Option<Rad50Name> {
    let (base, ext) = match name.split_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    };

    if base.is_empty() || base.len() > 6 || ext.len() > 3 {
        return None;
    }

    let base = format!("{base:<6}");
    let ext = format!("{ext:<3}");

    Some([
        to_rad50(&base[0..3])?,
        to_rad50(&base[3..6])?,
        to_rad50(&ext)?,
    ])
}

/// Render an on-disk name as "BASENAME.EXT" with padding spaces trimmed.
///
/// A file with an all-blank extension keeps its trailing dot, which is how
/// the original directory listings print such names.
#[must_use]
pub fn format_filename(name: &Rad50Name) -> String {
    let mut base = String::with_capacity(crate::FILENAME_MAX);
    base.extend(from_rad50(name[0]));
    base.extend(from_rad50(name[1]));

    let mut ext = String::with_capacity(3);
    ext.extend(from_rad50(name[2]));

    let mut printable = base.trim_end().to_string();
    printable.push('.');
    printable.push_str(&ext);
    printable.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_ordinals_match_the_alphabet() {
        assert_eq!(to_rad50("   "), Some(0));
        assert_eq!(to_rad50("ABC"), Some(1 * 1600 + 2 * 40 + 3));
        assert_eq!(to_rad50("999"), Some(39 * 1600 + 39 * 40 + 39));
        assert_eq!(to_rad50("$.%"), Some(27 * 1600 + 28 * 40 + 29));
    }

    #[test]
    fn encode_decode_round_trips() {
        for triple in ["XYZ", "A 9", "$$$", "RT "] {
            let word = to_rad50(triple).unwrap();
            let decoded: String = from_rad50(word).iter().collect();
            assert_eq!(decoded, triple);
        }
    }

    #[test]
    fn lowercase_is_rejected() {
        assert_eq!(to_rad50("abc"), None);
        assert_eq!(parse_filename("swap.sys"), None);
    }

    #[test]
    fn parse_pads_base_and_extension() {
        let name = parse_filename("SWAP.SYS").unwrap();
        assert_eq!(name[0], to_rad50("SWA").unwrap());
        assert_eq!(name[1], to_rad50("P  ").unwrap());
        assert_eq!(name[2], to_rad50("SYS").unwrap());
    }

    #[test]
    fn parse_rejects_oversized_components() {
        assert!(parse_filename("TOOLONGNAME").is_none());
        assert!(parse_filename("FILE.LONG").is_none());
        assert!(parse_filename("").is_none());
        assert!(parse_filename(".SYS").is_none());
    }

    #[test]
    fn parse_accepts_missing_extension() {
        let name = parse_filename("AB").unwrap();
        assert_eq!(name[2], 0);
        assert_eq!(format_filename(&name), "AB.");
    }

    #[test]
    fn format_trims_padding() {
        let name = parse_filename("SWAP.SYS").unwrap();
        assert_eq!(format_filename(&name), "SWAP.SYS");

        let short = parse_filename("A.B").unwrap();
        assert_eq!(format_filename(&short), "A.B");
    }
}
