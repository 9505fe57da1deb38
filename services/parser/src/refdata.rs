//! Reference tables: states, sectors, energy types and their aliases.
//!
//! Codes match the seeded `states`, `sectors` and `energy_types` tables.

/// Canonical state names (upper case) and their codes. `BHUTAN` appears in
/// the daily report as an import source.
pub const STATES: &[(&str, &str)] = &[
    ("DELHI", "DL"),
    ("HARYANA", "HRN"),
    ("HIMACHAL PRADESH", "HP"),
    ("JAMMU AND KASHMIR", "JAK"),
    ("LADAKH", "LDK"),
    ("PUNJAB", "PNB"),
    ("RAJASTHAN", "RJ"),
    ("UTTARAKHAND", "UTK"),
    ("UTTAR PRADESH", "UP"),
    ("ARUNACHAL PRADESH", "ACP"),
    ("ASSAM", "ASM"),
    ("MANIPUR", "MIP"),
    ("MEGHALAYA", "MGA"),
    ("MIZORAM", "MZM"),
    ("NAGALAND", "NGD"),
    ("TRIPURA", "TPA"),
    ("CHHATISGARH", "CTG"),
    ("GOA", "GOA"),
    ("GUJARAT", "GJT"),
    ("MADHYA PRADESH", "MPD"),
    ("MAHARASHTRA", "MHA"),
    ("ANDHRA PRADESH", "AP"),
    ("KARNATAKA", "KRT"),
    ("KERALA", "KRL"),
    ("LAKSHADWEEP", "LKS"),
    ("PUDUCHERRY", "PU"),
    ("TAMIL NADU", "TND"),
    ("TELANGANA", "TLG"),
    ("ANDAMAN AND NICOBAR ISLANDS", "ANI"),
    ("BIHAR", "BHR"),
    ("JHARKHAND", "JHK"),
    ("ODISHA", "ODI"),
    ("SIKKIM", "SKM"),
    ("WEST BENGAL", "BGL"),
    ("BHUTAN", "BHU"),
];

/// Historic and alternate spellings, mapped to canonical names.
pub const STATE_ALIASES: &[(&str, &str)] = &[
    ("PONDICHERRY", "PUDUCHERRY"),
    ("PONDY", "PUDUCHERRY"),
    ("UTTARANCHAL", "UTTARAKHAND"),
    ("ORISSA", "ODISHA"),
    ("CHHATTISGARH", "CHHATISGARH"),
    ("CHATTISGARH", "CHHATISGARH"),
    ("J&K", "JAMMU AND KASHMIR"),
    ("J & K", "JAMMU AND KASHMIR"),
    ("JAMMU & KASHMIR", "JAMMU AND KASHMIR"),
    ("A & N ISLANDS", "ANDAMAN AND NICOBAR ISLANDS"),
    ("A&N ISLANDS", "ANDAMAN AND NICOBAR ISLANDS"),
    ("ANDAMAN & NICOBAR ISLANDS", "ANDAMAN AND NICOBAR ISLANDS"),
    ("NCT OF DELHI", "DELHI"),
];

/// State names as they come out of the bilingual renewable PDF, with the
/// English label they stand for.
pub const BILINGUAL_STATE_NAMES: &[(&str, &str)] = &[
    ("चडंीगढ़", "Chandigarh"),
    ("दिल्ली", "Delhi"),
    ("हररयजणज", "Haryana"),
    ("दहमजचल प्रिेश", "Himachal Pradesh"),
    ("र्म्मू और कश्मीर", "Jammu and Kashmir"),
    ("लद्िजख़", "Ladakh"),
    ("परं्जब", "Punjab"),
    ("रजर्स्थजन", "Rajasthan"),
    ("उत्तर प्रिेश", "Uttar Pradesh"),
    ("उत्तरजखडं", "Uttarakhand"),
    ("उत्तरी के्षत्र", "Northern Region"),
    ("गरु्रजत", "Gujarat"),
    ("छत्तीसगढ़", "Chhattisgarh"),
    ("मध्य प्रिेश", "Madhya Pradesh"),
    ("महजरजष्ट्र", "Maharashtra"),
    ("आधं्र प्रिेश", "Andhra Pradesh"),
    ("तलेगंजनज", "Telangana"),
    ("कनजाटक", "Karnataka"),
    ("केरल", "Kerala"),
    ("तममलनजडु", "Tamil Nadu"),
    ("पवूी के्षत्र", "Eastern Region"),
    ("पश्श्चमी के्षत्र", "Western Region"),
    ("िक्षक्षणी के्षत्र", "Southern Region"),
    ("उत्तर-पवूी के्षत्र", "North Eastern Region"),
    ("सम्पणूा भजरत", "All India"),
];

/// Sector headers in the daily report, longest phrases first.
pub const SECTOR_ALIASES: &[(&str, &str)] = &[
    ("STATE SECTOR", "ST"),
    ("PVT. SECTOR", "PVT"),
    ("PVT SECTOR", "PVT"),
    ("CENTRAL SECTOR", "CCT"),
    ("PRIVATE SECTOR", "PVT"),
    ("STATE", "ST"),
    ("PRIVATE", "PVT"),
    ("CENTRAL", "CCT"),
    ("PVT", "PVT"),
];

/// Energy-type headers in the daily report.
pub const TYPE_ALIASES: &[(&str, &str)] = &[
    ("THER (GT)", "TGT"),
    ("THER (CGT)", "TGT"),
    ("THER (DG)", "TDG"),
    ("THERMAL", "TH"),
    ("HYDRO", "HY"),
    ("NUCLEAR", "NU"),
    ("WIND", "WI"),
    ("SOLAR", "SO"),
    ("BIOMASS", "BIO"),
];

/// Cells that are bare context keywords, never plant names.
pub const CONTEXT_KEYWORDS: &[&str] = &[
    "SECTOR:",
    "TYPE:",
    "STATE SECTOR",
    "PVT SECTOR",
    "PVT. SECTOR",
    "CENTRAL SECTOR",
    "PRIVATE SECTOR",
    "THERMAL",
    "HYDRO",
    "NUCLEAR",
    "THER (GT)",
    "THER (DG)",
    "STATE",
    "PVT",
    "CENTRAL",
    "PRIVATE",
];

/// Sector names in the renewable station table.
pub const RENEWABLE_SECTORS: &[(&str, &str)] = &[
    ("central", "CCT"),
    ("central sector", "CCT"),
    ("state", "ST"),
    ("state sector", "ST"),
    ("private", "PVT"),
    ("private sector", "PVT"),
    ("pvt", "PVT"),
];

/// Technology names in the renewable station table.
pub const RENEWABLE_TYPES: &[(&str, &str)] = &[
    ("solar", "SO"),
    ("wind", "WI"),
    ("hydro", "HY"),
    ("small hydro", "HY"),
    ("thermal", "TH"),
    ("nuclear", "NU"),
    ("biomass", "BIO"),
];

/// Code for a canonical state name.
pub fn state_code(canonical: &str) -> Option<&'static str> {
    STATES
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, code)| *code)
}

/// Canonical name an alias stands for.
pub fn state_alias(name: &str) -> Option<&'static str> {
    STATE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

pub fn lookup_ci(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    let key = key.trim();
    table
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| *v)
}

// =============================================================================
// Token-bounded matching
// =============================================================================

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

/// True when `needle` occurs in `haystack` without letters or digits glued
/// to either end. Both sides are expected upper case.
pub fn contains_token(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let hay = haystack.as_bytes();
    let first_is_word = is_word_byte(needle.as_bytes()[0]);
    let last_is_word = is_word_byte(needle.as_bytes()[needle.len() - 1]);
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let left_ok = !first_is_word || start == 0 || !is_word_byte(hay[start - 1]);
        let right_ok = !last_is_word || end == hay.len() || !is_word_byte(hay[end]);
        left_ok && right_ok
    })
}

/// Like [`contains_token`], also accepting `&` wherever the name says `AND`.
pub fn contains_state_name(haystack: &str, name: &str) -> bool {
    contains_token(haystack, name)
        || (name.contains(" AND ") && contains_token(haystack, &name.replace(" AND ", " & ")))
}

/// First canonical state named in `text`, with its code.
pub fn find_state(text: &str) -> Option<(&'static str, &'static str)> {
    STATES
        .iter()
        .find(|(name, _)| contains_state_name(text, name))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_token_respects_word_edges() {
        assert!(contains_token("STATE SECTOR", "STATE"));
        assert!(!contains_token("STATESMAN POWER", "STATE"));
        assert!(!contains_token("UTTARAKHAND", "UTTAR PRADESH"));
        assert!(contains_token("TYPE: THER (GT)", "THER (GT)"));
        assert!(contains_token("PVT. SECTOR", "PVT. SECTOR"));
    }

    #[test]
    fn test_state_name_accepts_ampersand() {
        assert!(contains_state_name("JAMMU & KASHMIR", "JAMMU AND KASHMIR"));
        assert_eq!(
            find_state("ANDAMAN & NICOBAR ISLANDS"),
            Some(("ANDAMAN AND NICOBAR ISLANDS", "ANI"))
        );
    }

    #[test]
    fn test_find_state_prefers_whole_names() {
        assert_eq!(find_state("UTTARAKHAND"), Some(("UTTARAKHAND", "UTK")));
        assert_eq!(find_state("UTTAR PRADESH"), Some(("UTTAR PRADESH", "UP")));
        assert_eq!(find_state("NORTHERN REGION"), None);
    }

    const INIT_MIGRATION: &str = include_str!("../migrations/20250801000000_init.sql");

    /// Codes inserted into `table` by the init migration's seed block.
    fn seeded_codes(table: &str) -> Vec<&'static str> {
        let marker = format!("INSERT INTO {table} (");
        let start = INIT_MIGRATION.find(&marker).unwrap_or_else(|| panic!("no seed for {table}"));
        let block = &INIT_MIGRATION[start..];
        let block = &block[..block.find(';').unwrap()];
        block
            .lines()
            .filter_map(|line| line.trim().strip_prefix("('"))
            .filter_map(|rest| rest.split('\'').next())
            .collect()
    }

    #[test]
    fn test_every_mapped_code_is_seeded() {
        let sectors = seeded_codes("sectors");
        let types = seeded_codes("energy_types");
        let states = seeded_codes("states");
        assert_eq!(sectors.len(), 3);
        for (_, code) in SECTOR_ALIASES.iter().chain(RENEWABLE_SECTORS) {
            assert!(sectors.contains(code), "sector {code}");
        }
        for (_, code) in TYPE_ALIASES.iter().chain(RENEWABLE_TYPES) {
            assert!(types.contains(code), "type {code}");
        }
        for (_, code) in STATES {
            assert!(states.contains(code), "state {code}");
        }
    }

    #[test]
    fn test_alias_and_code_lookup() {
        assert_eq!(state_alias("ORISSA"), Some("ODISHA"));
        assert_eq!(state_code("ODISHA"), Some("ODI"));
        assert_eq!(lookup_ci(RENEWABLE_TYPES, " Solar "), Some("SO"));
    }

    #[test]
    fn test_every_alias_points_at_a_canonical_state() {
        for (alias, canonical) in STATE_ALIASES {
            assert!(state_code(canonical).is_some(), "{alias} -> {canonical}");
        }
    }
}
