//! Number-to-words rewriting for speech input

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [&str; 7] = [
    "", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion",
];

/// Rewrites text before synthesis. Must return the input unchanged when it
/// cannot handle part of it.
pub trait TextTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, text: &str) -> String;
}

/// Spells digit runs as British-style English words ("123" → "one hundred and twenty-three")
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishNumberSpeller;

impl TextTransform for EnglishNumberSpeller {
    fn name(&self) -> &str {
        "english-number-speller"
    }

    fn apply(&self, text: &str) -> String {
        DIGIT_RUN
            .replace_all(text, |caps: &Captures| {
                let digits = &caps[0];
                match digits.parse::<u64>() {
                    Ok(n) => number_to_words(n),
                    Err(_) => {
                        log::warn!("Number too long to spell, leaving as digits: {}", digits);
                        digits.to_string()
                    }
                }
            })
            .into_owned()
    }
}

fn below_hundred(n: u64) -> String {
    match n {
        0..=19 => ONES[n as usize].to_string(),
        _ => {
            let tens = TENS[(n / 10) as usize];
            match n % 10 {
                0 => tens.to_string(),
                unit => format!("{}-{}", tens, ONES[unit as usize]),
            }
        }
    }
}

fn below_thousand(n: u64) -> String {
    let hundreds = n / 100;
    let rest = n % 100;
    match (hundreds, rest) {
        (0, rest) => below_hundred(rest),
        (h, 0) => format!("{} hundred", ONES[h as usize]),
        (h, rest) => format!("{} hundred and {}", ONES[h as usize], below_hundred(rest)),
    }
}

/// Spell a number in English words
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }

    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 1000);
        rest /= 1000;
    }

    let mut words = String::new();
    for (scale, &group) in groups.iter().enumerate().rev() {
        if group == 0 {
            continue;
        }
        if !words.is_empty() {
            // Last group without hundreds joins with "and", as in "one thousand and five"
            if scale == 0 && group < 100 {
                words.push_str(" and ");
            } else {
                words.push_str(", ");
            }
        }
        words.push_str(&below_thousand(group));
        if scale > 0 {
            words.push(' ');
            words.push_str(SCALES[scale]);
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_numbers() {
        assert_eq!(number_to_words(0), "zero");
        assert_eq!(number_to_words(7), "seven");
        assert_eq!(number_to_words(15), "fifteen");
        assert_eq!(number_to_words(40), "forty");
        assert_eq!(number_to_words(42), "forty-two");
    }

    #[test]
    fn test_hundreds_use_and() {
        assert_eq!(number_to_words(100), "one hundred");
        assert_eq!(number_to_words(123), "one hundred and twenty-three");
    }

    #[test]
    fn test_scales() {
        assert_eq!(number_to_words(1000), "one thousand");
        assert_eq!(number_to_words(1005), "one thousand and five");
        assert_eq!(number_to_words(1234), "one thousand, two hundred and thirty-four");
        assert_eq!(number_to_words(2_000_100), "two million, one hundred");
        assert_eq!(
            number_to_words(u64::MAX),
            "eighteen quintillion, four hundred and forty-six quadrillion, seven hundred and forty-four trillion, \
             seventy-three billion, seven hundred and nine million, five hundred and fifty-one thousand, \
             six hundred and fifteen"
        );
    }

    #[test]
    fn test_apply_rewrites_digit_runs_only() {
        let speller = EnglishNumberSpeller;
        assert_eq!(
            speller.apply("I have 2 cats and 15 fish."),
            "I have two cats and fifteen fish."
        );
        assert_eq!(speller.apply("no digits"), "no digits");
    }

    #[test]
    fn test_apply_leaves_unspellable_runs() {
        let speller = EnglishNumberSpeller;
        let huge = "99999999999999999999999";
        assert_eq!(speller.apply(huge), huge);
    }
}
