//! Splitting of long texts into router-sized SMS segments.
//!
//! Lengths are counted in chars. Splits prefer whitespace near the end of the
//! available budget, then punctuation, and only cut words as a last resort.
//! With numbering enabled every segment carries an `i/N: ` prefix whose `N`
//! is the final segment count.

use serde::{Deserialize, Serialize};

/// Default maximum length of one SMS.
pub const DEFAULT_MAX_LENGTH: usize = 160;
/// Default lookback (in chars) when searching for whitespace to split at.
pub const DEFAULT_WHITESPACE_WINDOW: usize = 20;
/// Default lookback (in chars) when searching for punctuation to split at.
pub const DEFAULT_PUNCTUATION_WINDOW: usize = 10;

const WHITESPACE: [char; 4] = [' ', '\n', '\t', '\r'];
const PUNCTUATION: [char; 9] = ['.', ',', ';', ':', '!', '?', '-', '–', '—'];

/// Parameters of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOptions {
    /// Maximum rendered length of one segment, prefix included.
    pub max_length: usize,
    /// Prefix every segment with `i/N: `.
    pub numbering: bool,
    /// How far back from the budget boundary to look for whitespace.
    pub whitespace_window: usize,
    /// How far back from the budget boundary to look for punctuation.
    pub punctuation_window: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            numbering: true,
            whitespace_window: DEFAULT_WHITESPACE_WINDOW,
            punctuation_window: DEFAULT_PUNCTUATION_WINDOW,
        }
    }
}

impl SplitOptions {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            ..Self::default()
        }
    }

    pub fn without_numbering(mut self) -> Self {
        self.numbering = false;
        self
    }

    pub fn with_windows(mut self, whitespace: usize, punctuation: usize) -> Self {
        self.whitespace_window = whitespace;
        self.punctuation_window = punctuation;
        self
    }
}

/// One piece of a split message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position.
    pub index: usize,
    /// Number of segments the message was split into.
    pub total: usize,
    pub body: String,
    /// Whether the rendered text carries the `i/N: ` prefix.
    pub numbered: bool,
}

impl Segment {
    fn single(body: &str) -> Self {
        Self {
            index: 1,
            total: 1,
            body: body.to_string(),
            numbered: false,
        }
    }

    pub fn prefix(&self) -> String {
        if self.numbered {
            format!("{}/{}: ", self.index, self.total)
        } else {
            String::new()
        }
    }

    /// Text as it is handed to the router.
    pub fn render(&self) -> String {
        format!("{}{}", self.prefix(), self.body)
    }

    pub fn rendered_len(&self) -> usize {
        self.prefix().chars().count() + self.body.chars().count()
    }
}

/// Splits `message` into segments no longer than `options.max_length`.
///
/// Messages that already fit (including the empty message) come back as a
/// single unprefixed segment. With numbering, a provisional prefix width is
/// derived from the estimated segment count; if the real count needs a wider
/// prefix the greedy pass is repeated once with the smaller budget. A
/// `max_length` of zero is treated as one.
pub fn split_message(message: &str, options: &SplitOptions) -> Vec<Segment> {
    let max = options.max_length.max(1);
    let chars: Vec<char> = message.chars().collect();

    if chars.len() <= max {
        return vec![Segment::single(message)];
    }

    if !options.numbering {
        return unnumbered(greedy_split(&chars, max, options));
    }

    let estimated = chars.len().div_ceil(max);
    let provisional = numbering_width(estimated);
    if provisional >= max {
        // No room for a body next to the prefix.
        return unnumbered(greedy_split(&chars, max, options));
    }

    let mut parts = greedy_split(&chars, max - provisional, options);
    let actual = numbering_width(parts.len());
    if actual > provisional && actual < max {
        parts = greedy_split(&chars, max - actual, options);
    }

    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, body)| render_numbered(i + 1, total, body, max, options))
        .collect()
}

/// Like [`split_message`] but returns the rendered texts.
pub fn split_sms_message(message: &str, options: &SplitOptions) -> Vec<String> {
    split_message(message, options)
        .iter()
        .map(Segment::render)
        .collect()
}

/// Width of the widest prefix for `total` segments, e.g. `"12/12: "`.
fn numbering_width(total: usize) -> usize {
    format!("{total}/{total}: ").len()
}

fn unnumbered(parts: Vec<String>) -> Vec<Segment> {
    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, body)| Segment {
            index: i + 1,
            total,
            body,
            numbered: false,
        })
        .collect()
}

fn render_numbered(
    index: usize,
    total: usize,
    body: String,
    max: usize,
    options: &SplitOptions,
) -> Segment {
    let segment = Segment {
        index,
        total,
        body,
        numbered: true,
    };
    if segment.rendered_len() <= max {
        return segment;
    }

    let prefix_len = segment.prefix().len();
    if prefix_len >= max {
        return Segment {
            numbered: false,
            ..segment
        };
    }

    let chars: Vec<char> = segment.body.chars().collect();
    let (head, _) = take_head(&chars, max - prefix_len, options);
    Segment {
        body: head,
        ..segment
    }
}

/// Greedy pass: repeatedly cut `budget`-sized heads off the text.
fn greedy_split(text: &[char], budget: usize, options: &SplitOptions) -> Vec<String> {
    let mut parts = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= budget {
            parts.push(remaining.iter().collect());
            break;
        }
        let (head, tail) = take_head(remaining, budget, options);
        parts.push(head);
        remaining = tail;
    }

    parts
}

/// Splits off a head of at most `budget` chars and returns it with the rest.
///
/// The head loses trailing whitespace and the rest loses leading whitespace.
/// If the boundary search only yields whitespace, the text is cut hard at
/// `budget`.
fn take_head<'a>(text: &'a [char], budget: usize, options: &SplitOptions) -> (String, &'a [char]) {
    if text.len() <= budget {
        return (text.iter().collect(), &[]);
    }

    let cut = find_cut(text, budget, options);
    let head = trim_end(&text[..cut]);
    if head.is_empty() {
        return (text[..budget].iter().collect(), trim_start(&text[budget..]));
    }
    (head.iter().collect(), trim_start(&text[cut..]))
}

/// Index to cut at. Requires `text.len() > budget >= 1`.
fn find_cut(text: &[char], budget: usize, options: &SplitOptions) -> usize {
    // Whitespace at the boundary itself still works: it is trimmed off the head.
    let floor = budget.saturating_sub(options.whitespace_window);
    if let Some(i) = (floor + 1..=budget)
        .rev()
        .find(|&i| WHITESPACE.contains(&text[i]))
    {
        return i + 1;
    }

    // Punctuation stays on the head, so it must sit inside the budget.
    let floor = budget.saturating_sub(options.punctuation_window);
    if let Some(i) = (floor + 1..budget)
        .rev()
        .find(|&i| PUNCTUATION.contains(&text[i]))
    {
        return i + 1;
    }

    budget
}

fn trim_end(text: &[char]) -> &[char] {
    let end = text
        .iter()
        .rposition(|c| !c.is_whitespace())
        .map_or(0, |i| i + 1);
    &text[..end]
}

fn trim_start(text: &[char]) -> &[char] {
    let start = text
        .iter()
        .position(|c| !c.is_whitespace())
        .unwrap_or(text.len());
    &text[start..]
}
