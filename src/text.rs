//! Text normalization shared by filename heuristics and query matching.

/// Uppercase with Greek diacritics folded to plain capitals.
///
/// Uppercasing alone keeps the tonos (`χρήσης` becomes `ΧΡΉΣΗΣ`), which
/// defeats substring matching against unaccented keywords, so the accented
/// capitals are mapped down and stray combining marks dropped.
pub(crate) fn uppercase_folded(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .map(|c| match c {
            'Ά' => 'Α',
            'Έ' => 'Ε',
            'Ή' => 'Η',
            'Ί' | 'Ϊ' => 'Ι',
            'Ό' => 'Ο',
            'Ύ' | 'Ϋ' => 'Υ',
            'Ώ' => 'Ω',
            other => other,
        })
        .filter(|c| !('\u{0300}'..='\u{036F}').contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_greek_tonos() {
        assert_eq!(uppercase_folded("χρήσης"), "ΧΡΗΣΗΣ");
        assert_eq!(uppercase_folded("βλάβη"), "ΒΛΑΒΗ");
        assert_eq!(uppercase_folded("εγκατάσταση"), "ΕΓΚΑΤΑΣΤΑΣΗ");
    }

    #[test]
    fn test_ascii_is_plain_uppercase() {
        assert_eq!(uppercase_folded("Error E3 codes"), "ERROR E3 CODES");
    }

    #[test]
    fn test_dialytika_variants() {
        assert_eq!(uppercase_folded("προϊόν"), "ΠΡΟΙΟΝ");
    }
}
