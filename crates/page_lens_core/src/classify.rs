//! crates/page_lens_core/src/classify.rs
//!
//! Heuristic text classifier deciding whether a text selection looks like math.
//! It is not a parser: false positives and negatives are silent.

use crate::domain::SelectionKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// Operators, relations and Greek letters that only show up in running text as math.
const MATH_SYMBOLS: &[char] = &[
    '∫', '∬', '∭', '∮', '∑', '∏', '√', '∛', '∞', '∂', '∇', '∆', '≈', '≠', '≡', '≤', '≥', '±',
    '∓', '×', '÷', '·', '∈', '∉', '⊂', '⊆', '⊃', '∪', '∩', '∀', '∃', '→', '⇒', '⇔', '∝', 'α', 'β',
    'γ', 'δ', 'ε', 'ζ', 'η', 'θ', 'ι', 'κ', 'λ', 'μ', 'ν', 'ξ', 'π', 'ρ', 'σ', 'τ', 'φ', 'χ', 'ψ',
    'ω', 'Γ', 'Δ', 'Θ', 'Λ', 'Ξ', 'Π', 'Σ', 'Φ', 'Ψ', 'Ω',
];

/// A digit directly followed by a caret or a superscript digit, e.g. `2^3` or `x2²`.
static EXPONENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\^⁰¹²³⁴⁵⁶⁷⁸⁹]").unwrap());

/// A lone letter used as a variable: `letter (ws)? operator (ws)? alnum`, e.g. `x = 5`.
static SINGLE_LETTER_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z]\s?[=+\-*/^<>]\s?[A-Za-z0-9]").unwrap());

/// Classifies a text selection as either plain text or an equation.
pub fn classify(text: &str) -> SelectionKind {
    if looks_like_math(text) {
        SelectionKind::Equation
    } else {
        SelectionKind::Text
    }
}

fn looks_like_math(text: &str) -> bool {
    text.chars().any(|c| MATH_SYMBOLS.contains(&c))
        || EXPONENT.is_match(text)
        || SINGLE_LETTER_VARIABLE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_is_an_equation() {
        assert_eq!(classify("∫f(x)dx"), SelectionKind::Equation);
    }

    #[test]
    fn prose_is_text() {
        assert_eq!(classify("The cat sat"), SelectionKind::Text);
        assert_eq!(classify("Chapter 3 covers the basics."), SelectionKind::Text);
    }

    #[test]
    fn single_letter_assignment_is_an_equation() {
        assert_eq!(classify("x = 5"), SelectionKind::Equation);
        assert_eq!(classify("y+2"), SelectionKind::Equation);
    }

    #[test]
    fn exponents_are_equations() {
        assert_eq!(classify("2^10 bytes"), SelectionKind::Equation);
        assert_eq!(classify("area is 4²"), SelectionKind::Equation);
    }

    #[test]
    fn greek_letters_are_equations() {
        assert_eq!(classify("the angle θ"), SelectionKind::Equation);
    }

    #[test]
    fn multi_letter_words_around_operators_stay_text() {
        assert_eq!(classify("cost = price"), SelectionKind::Text);
    }
}
