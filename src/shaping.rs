//! Text preparation for mixed Latin/Arabic/Kurdish values.
//!
//! PDF text operators draw glyphs in the order they appear in the
//! string, so right-to-left text has to be converted to visual order
//! before it hits a content stream, and Arabic letters have to be
//! mapped to their contextual presentation forms first. `shape` does
//! both; strings that are not Arabic-dominant pass through untouched.

use unicode_bidi::BidiInfo;

/// Contextual glyph forms for one Arabic letter. Letters that only
/// join to the previous letter have no initial/medial forms.
#[derive(Debug, Clone, Copy)]
struct Forms {
    isolated: char,
    final_: Option<char>,
    initial: Option<char>,
    medial: Option<char>,
}

const fn forms(isolated: char, final_: char, initial: char, medial: char) -> Forms {
    Forms {
        isolated,
        final_: Some(final_),
        initial: Some(initial),
        medial: Some(medial),
    }
}

const fn right_joining(isolated: char, final_: char) -> Forms {
    Forms {
        isolated,
        final_: Some(final_),
        initial: None,
        medial: None,
    }
}

fn presentation_forms(ch: char) -> Option<Forms> {
    let forms = match ch {
        '\u{0621}' => Forms {
            isolated: '\u{FE80}',
            final_: None,
            initial: None,
            medial: None,
        },
        '\u{0622}' => right_joining('\u{FE81}', '\u{FE82}'),
        '\u{0623}' => right_joining('\u{FE83}', '\u{FE84}'),
        '\u{0624}' => right_joining('\u{FE85}', '\u{FE86}'),
        '\u{0625}' => right_joining('\u{FE87}', '\u{FE88}'),
        '\u{0626}' => forms('\u{FE89}', '\u{FE8A}', '\u{FE8B}', '\u{FE8C}'),
        '\u{0627}' => right_joining('\u{FE8D}', '\u{FE8E}'),
        '\u{0628}' => forms('\u{FE8F}', '\u{FE90}', '\u{FE91}', '\u{FE92}'),
        '\u{0629}' => right_joining('\u{FE93}', '\u{FE94}'),
        '\u{062A}' => forms('\u{FE95}', '\u{FE96}', '\u{FE97}', '\u{FE98}'),
        '\u{062B}' => forms('\u{FE99}', '\u{FE9A}', '\u{FE9B}', '\u{FE9C}'),
        '\u{062C}' => forms('\u{FE9D}', '\u{FE9E}', '\u{FE9F}', '\u{FEA0}'),
        '\u{062D}' => forms('\u{FEA1}', '\u{FEA2}', '\u{FEA3}', '\u{FEA4}'),
        '\u{062E}' => forms('\u{FEA5}', '\u{FEA6}', '\u{FEA7}', '\u{FEA8}'),
        '\u{062F}' => right_joining('\u{FEA9}', '\u{FEAA}'),
        '\u{0630}' => right_joining('\u{FEAB}', '\u{FEAC}'),
        '\u{0631}' => right_joining('\u{FEAD}', '\u{FEAE}'),
        '\u{0632}' => right_joining('\u{FEAF}', '\u{FEB0}'),
        '\u{0633}' => forms('\u{FEB1}', '\u{FEB2}', '\u{FEB3}', '\u{FEB4}'),
        '\u{0634}' => forms('\u{FEB5}', '\u{FEB6}', '\u{FEB7}', '\u{FEB8}'),
        '\u{0635}' => forms('\u{FEB9}', '\u{FEBA}', '\u{FEBB}', '\u{FEBC}'),
        '\u{0636}' => forms('\u{FEBD}', '\u{FEBE}', '\u{FEBF}', '\u{FEC0}'),
        '\u{0637}' => forms('\u{FEC1}', '\u{FEC2}', '\u{FEC3}', '\u{FEC4}'),
        '\u{0638}' => forms('\u{FEC5}', '\u{FEC6}', '\u{FEC7}', '\u{FEC8}'),
        '\u{0639}' => forms('\u{FEC9}', '\u{FECA}', '\u{FECB}', '\u{FECC}'),
        '\u{063A}' => forms('\u{FECD}', '\u{FECE}', '\u{FECF}', '\u{FED0}'),
        '\u{0641}' => forms('\u{FED1}', '\u{FED2}', '\u{FED3}', '\u{FED4}'),
        '\u{0642}' => forms('\u{FED5}', '\u{FED6}', '\u{FED7}', '\u{FED8}'),
        '\u{0643}' => forms('\u{FED9}', '\u{FEDA}', '\u{FEDB}', '\u{FEDC}'),
        '\u{0644}' => forms('\u{FEDD}', '\u{FEDE}', '\u{FEDF}', '\u{FEE0}'),
        '\u{0645}' => forms('\u{FEE1}', '\u{FEE2}', '\u{FEE3}', '\u{FEE4}'),
        '\u{0646}' => forms('\u{FEE5}', '\u{FEE6}', '\u{FEE7}', '\u{FEE8}'),
        '\u{0647}' => forms('\u{FEE9}', '\u{FEEA}', '\u{FEEB}', '\u{FEEC}'),
        '\u{0648}' => right_joining('\u{FEED}', '\u{FEEE}'),
        '\u{0649}' => right_joining('\u{FEEF}', '\u{FEF0}'),
        '\u{064A}' => forms('\u{FEF1}', '\u{FEF2}', '\u{FEF3}', '\u{FEF4}'),
        // Extended letters that reach us from Kurdish/Persian input.
        '\u{067E}' => forms('\u{FB56}', '\u{FB57}', '\u{FB58}', '\u{FB59}'),
        '\u{0686}' => forms('\u{FB7A}', '\u{FB7B}', '\u{FB7C}', '\u{FB7D}'),
        '\u{0698}' => right_joining('\u{FB8A}', '\u{FB8B}'),
        '\u{06A9}' => forms('\u{FB8E}', '\u{FB8F}', '\u{FB90}', '\u{FB91}'),
        '\u{06AF}' => forms('\u{FB92}', '\u{FB93}', '\u{FB94}', '\u{FB95}'),
        '\u{06CC}' => forms('\u{FBFC}', '\u{FBFD}', '\u{FBFE}', '\u{FBFF}'),
        _ => return None,
    };
    Some(forms)
}

/// Lam-alef pairs contract into a single ligature glyph.
fn lam_alef_ligature(alef: char) -> Option<(char, char)> {
    match alef {
        '\u{0622}' => Some(('\u{FEF5}', '\u{FEF6}')),
        '\u{0623}' => Some(('\u{FEF7}', '\u{FEF8}')),
        '\u{0625}' => Some(('\u{FEF9}', '\u{FEFA}')),
        '\u{0627}' => Some(('\u{FEFB}', '\u{FEFC}')),
        _ => None,
    }
}

/// Harakat and similar combining marks are transparent for joining.
fn is_transparent(ch: char) -> bool {
    matches!(ch, '\u{064B}'..='\u{065F}' | '\u{0670}')
}

fn is_invisible_mark(ch: char) -> bool {
    matches!(ch, '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}')
}

pub fn is_arabic_char(ch: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&ch)
}

/// A string is treated as right-to-left when Arabic-range characters
/// make up more than half of it (directional control marks excluded).
/// Exactly half is not enough.
pub fn is_rtl(text: &str) -> bool {
    let cleaned: String = text.chars().filter(|ch| !is_invisible_mark(*ch)).collect();
    let trimmed = cleaned.trim();
    let arabic = trimmed.chars().filter(|ch| is_arabic_char(*ch)).count();
    arabic * 2 > trimmed.chars().count()
}

/// Rewrite Kurdish letterforms to their nearest Arabic equivalents:
/// U+06CE becomes U+064A unconditionally; U+06D5 inside a word becomes
/// U+0647 with a space inserted after it. A word-boundary heuristic,
/// not transliteration.
pub fn normalize_kurdish(text: &str) -> String {
    let replaced = text.replace('\u{06CE}', "\u{064A}");
    let chars: Vec<char> = replaced.chars().collect();
    let mut out = String::with_capacity(replaced.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch == '\u{06D5}' {
            let prev_is_space = i > 0 && chars[i - 1] == ' ';
            let next_in_word = chars.get(i + 1).is_some_and(|next| *next != ' ');
            if !prev_is_space && next_in_word {
                out.push('\u{0647}');
                out.push(' ');
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Prepare a value for drawing: trim, and when the text is
/// Arabic-dominant, reshape to presentation forms and reorder to
/// visual order. Never fails; any inconsistency degrades to the
/// trimmed input.
pub fn shape(text: &str) -> String {
    let trimmed = text.trim();
    if !is_rtl(trimmed) {
        return trimmed.to_string();
    }
    let reshaped = reshape_arabic(trimmed);
    reorder_visual(&reshaped)
}

fn reorder_visual(text: &str) -> String {
    let bidi = BidiInfo::new(text, None);
    match bidi.paragraphs.first() {
        Some(paragraph) if bidi.paragraphs.len() == 1 => bidi
            .reorder_line(paragraph, paragraph.range.clone())
            .into_owned(),
        _ => text.to_string(),
    }
}

/// Select a presentation form per letter based on its joining context.
fn reshape_arabic(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if is_transparent(ch) {
            out.push(ch);
            i += 1;
            continue;
        }

        let Some(current) = presentation_forms(ch) else {
            out.push(ch);
            i += 1;
            continue;
        };

        let linked_before = joins_forward(&chars, i) && current.final_.is_some();

        // Lam-alef contraction takes the whole pair.
        if ch == '\u{0644}' {
            if let Some(&next) = chars.get(i + 1) {
                if let Some((isolated, final_)) = lam_alef_ligature(next) {
                    out.push(if linked_before { final_ } else { isolated });
                    i += 2;
                    continue;
                }
            }
        }

        let linked_after = current.initial.is_some() && joins_backward(&chars, i);
        let form = match (linked_before, linked_after) {
            (true, true) => current.medial,
            (true, false) => current.final_,
            (false, true) => current.initial,
            (false, false) => None,
        };
        out.push(form.unwrap_or(current.isolated));
        i += 1;
    }

    out
}

/// Whether the nearest non-transparent character before `index` can
/// connect into this one.
fn joins_forward(chars: &[char], index: usize) -> bool {
    chars[..index]
        .iter()
        .rev()
        .find(|ch| !is_transparent(**ch))
        .and_then(|ch| presentation_forms(*ch))
        .is_some_and(|forms| forms.initial.is_some())
}

/// Whether the nearest non-transparent character after `index` can
/// receive a connection from this one.
fn joins_backward(chars: &[char], index: usize) -> bool {
    chars[index + 1..]
        .iter()
        .find(|ch| !is_transparent(**ch))
        .and_then(|ch| presentation_forms(*ch))
        .is_some_and(|forms| forms.final_.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_text_is_returned_trimmed() {
        assert_eq!(shape("  Jane Doe  "), "Jane Doe");
        assert_eq!(shape("555-0100"), "555-0100");
    }

    #[test]
    fn majority_detection_uses_a_strict_threshold() {
        assert!(is_rtl("سلام"));
        assert!(is_rtl("سلام ab"));
        // Exactly half Arabic is not shaped.
        assert!(!is_rtl("سلab"));
        assert!(!is_rtl("Jane"));
        assert!(!is_rtl(""));
    }

    #[test]
    fn directional_marks_do_not_count() {
        assert!(is_rtl("\u{200F}سلام\u{200E}"));
    }

    #[test]
    fn reshape_selects_contextual_forms() {
        // م ح م د: initial, medial, medial, final.
        assert_eq!(
            reshape_arabic("\u{0645}\u{062D}\u{0645}\u{062F}"),
            "\u{FEE3}\u{FEA4}\u{FEE4}\u{FEAA}"
        );
    }

    #[test]
    fn right_joining_letters_break_the_chain() {
        // د ا ر: nothing connects forward, every letter stays isolated.
        assert_eq!(
            reshape_arabic("\u{062F}\u{0627}\u{0631}"),
            "\u{FEA9}\u{FE8D}\u{FEAD}"
        );
        // ب د: the beh connects into the dal.
        assert_eq!(reshape_arabic("\u{0628}\u{062F}"), "\u{FE91}\u{FEAA}");
    }

    #[test]
    fn lam_alef_contracts_to_a_ligature() {
        assert_eq!(reshape_arabic("\u{0644}\u{0627}"), "\u{FEFB}");
        // س ل ا م: the pair sits after a connecting seen.
        assert_eq!(
            reshape_arabic("\u{0633}\u{0644}\u{0627}\u{0645}"),
            "\u{FEB3}\u{FEFC}\u{FEE1}"
        );
    }

    #[test]
    fn shaped_output_is_in_visual_order() {
        // Logical initial-to-final reading reverses for display.
        assert_eq!(
            shape("\u{0645}\u{062D}\u{0645}\u{062F}"),
            "\u{FEAA}\u{FEE4}\u{FEA4}\u{FEE3}"
        );
    }

    #[test]
    fn kurdish_yeh_is_rewritten() {
        assert_eq!(normalize_kurdish("\u{0631}\u{06CE}\u{0632}"), "\u{0631}\u{064A}\u{0632}");
    }

    #[test]
    fn kurdish_ae_splits_inside_words_only() {
        // Mid-word: rewritten with an inserted space.
        assert_eq!(
            normalize_kurdish("\u{0628}\u{06D5}\u{0631}"),
            "\u{0628}\u{0647} \u{0631}"
        );
        // Word-final: untouched.
        assert_eq!(normalize_kurdish("\u{0646}\u{0627}\u{0645}\u{06D5}"), "\u{0646}\u{0627}\u{0645}\u{06D5}");
        // Already followed by a space: untouched.
        assert_eq!(normalize_kurdish("\u{06D5} \u{06A9}"), "\u{06D5} \u{06A9}");
    }
}
