//! Caller utterance classification — pure text, no I/O.
//!
//! Finalized transcripts are normalized (case-folded, diacritics
//! stripped, trimmed) and matched against fixed phrase tables. The
//! evaluation order is fixed: farewell, then decline, then accept.
//! Decline is deliberately checked before accept, so an utterance
//! carrying both cues classifies as decline.

/// Outcome of classifying one finalized caller transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Leave-taking phrase detected; wins over everything else.
    Farewell,
    /// Caller can't or won't talk now.
    Decline,
    /// Caller agreed to proceed.
    Accept,
    /// Neither clearly yes nor no.
    Ambiguous,
}

const FAREWELL_PHRASES: &[&str] = &[
    "chau",
    "adios",
    "hasta luego",
    "nos vemos",
    "corta la llamada",
    "bye",
    "goodbye",
    "hang up",
];

const DECLINE_PHRASES: &[&str] = &[
    "ahora no",
    "no puedo",
    "estoy ocupado",
    "estoy ocupada",
    "mas tarde",
    "en otro momento",
    "llamame despues",
    "no",
    "can't now",
    "cannot now",
    "busy",
    "later",
    "not now",
];

const ACCEPT_PHRASES: &[&str] = &[
    "si",
    "dale",
    "claro",
    "por supuesto",
    "adelante",
    "tengo tiempo",
    "bueno",
    "ok",
    "yes",
    "sure",
    "go ahead",
    "i have time",
];

/// Case-fold, strip diacritics, and trim a transcript for matching.
pub fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .map(fold_char)
        .collect::<String>()
        .to_lowercase()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        _ => c,
    }
}

/// Multi-word phrases match as substrings; single words match whole
/// words only, so "si" never fires inside "imposible".
fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    if phrase.contains(' ') {
        normalized.contains(phrase)
    } else {
        normalized
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == phrase)
    }
}

fn matches_any(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(normalized, p))
}

/// Classify a finalized caller transcript.
pub fn classify(text: &str) -> Classification {
    let normalized = normalize(text);

    if matches_any(&normalized, FAREWELL_PHRASES) {
        return Classification::Farewell;
    }
    // Fixed order: decline before accept (see DESIGN.md).
    if matches_any(&normalized, DECLINE_PHRASES) {
        return Classification::Decline;
    }
    if matches_any(&normalized, ACCEPT_PHRASES) {
        return Classification::Accept;
    }
    Classification::Ambiguous
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_case_and_diacritics() {
        assert_eq!(normalize("  Adiós  "), "adios");
        assert_eq!(normalize("SÍ, DALE"), "si, dale");
    }

    #[test]
    fn test_accept_phrases() {
        assert_eq!(classify("dale"), Classification::Accept);
        assert_eq!(classify("sí, claro"), Classification::Accept);
        assert_eq!(classify("sure, go ahead"), Classification::Accept);
        assert_eq!(classify("tengo tiempo"), Classification::Accept);
    }

    #[test]
    fn test_decline_phrases() {
        assert_eq!(classify("ahora no puedo"), Classification::Decline);
        assert_eq!(classify("estoy ocupada"), Classification::Decline);
        assert_eq!(classify("I'm busy right now"), Classification::Decline);
    }

    #[test]
    fn test_farewell_phrases() {
        assert_eq!(classify("chau"), Classification::Farewell);
        assert_eq!(classify("bueno, hasta luego"), Classification::Farewell);
        assert_eq!(classify("ok goodbye"), Classification::Farewell);
    }

    #[test]
    fn test_farewell_wins_over_accept() {
        assert_eq!(classify("dale, chau"), Classification::Farewell);
    }

    #[test]
    fn test_decline_wins_over_accept() {
        // Both cues present: fixed order picks decline.
        assert_eq!(classify("sí pero ahora no puedo"), Classification::Decline);
    }

    #[test]
    fn test_ambiguous() {
        assert_eq!(classify("¿quién habla?"), Classification::Ambiguous);
        assert_eq!(classify(""), Classification::Ambiguous);
    }

    #[test]
    fn test_short_words_match_whole_words_only() {
        // "si" is a substring of "imposible" but not a word in it.
        assert_eq!(classify("imposible decirlo"), Classification::Ambiguous);
    }
}
