use serde::{Deserialize, Serialize};

use crate::font::{FontResolver, ResolvedFont};

/// Placeholder strings spreadsheet imports leave behind for empty cells.
pub const BLANK_SENTINELS: &[&str] = &["nan", "none", "null", "undefined"];

pub const DEFAULT_LINE_HEIGHT_FACTOR: f32 = 1.25;

// Delimiters in priority order with the joiner used when re-assembling a line.
const WRAP_DELIMITERS: &[(&str, &str)] = &[("、", "、"), ("，", "，"), (",", ", "), (" ", " ")];

pub trait TextMeasure {
    /// Width in points of `text` set at `font_size` points.
    fn text_width(&self, text: &str, font_size: f32) -> f32;
}

/// Measures with one resolved font.
pub struct FontMeasure<'a> {
    pub fonts: &'a FontResolver,
    pub font: &'a ResolvedFont,
}

impl TextMeasure for FontMeasure<'_> {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        self.fonts.measure(self.font, font_size, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[serde(alias = "LEFT", alias = "Left")]
    Left,
    #[default]
    #[serde(alias = "CENTER", alias = "Center", alias = "centre")]
    Center,
    #[serde(alias = "RIGHT", alias = "Right")]
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[serde(alias = "UP", alias = "Up")]
    Up,
    #[serde(alias = "DOWN", alias = "Down")]
    Down,
}

pub fn is_blank(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty()
        || BLANK_SENTINELS
            .iter()
            .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Returns the value unchanged, or "" when it is absent or a blank sentinel.
pub fn normalize_value(raw: Option<&str>) -> String {
    match raw {
        Some(value) if !is_blank(value) => value.to_string(),
        _ => String::new(),
    }
}

/// Splits on the first delimiter present (`、`, `，`, `,`, space) and returns
/// the trimmed, non-empty tokens with the joiner for rebuilding lines.
pub fn split_wrap_tokens(text: &str) -> (Vec<String>, &'static str) {
    let text = text.trim();
    if text.is_empty() {
        return (Vec::new(), "、");
    }
    for (delimiter, joiner) in WRAP_DELIMITERS {
        if text.contains(delimiter) {
            let tokens = text
                .split(delimiter)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            return (tokens, *joiner);
        }
    }
    (vec![text.to_string()], "、")
}

/// Greedy line fill. A token wider than `max_width` on its own still gets a
/// line of its own; tokens are never split.
pub fn wrap_lines(
    text: &str,
    max_width: f32,
    font_size: f32,
    measure: &dyn TextMeasure,
) -> Vec<String> {
    let (tokens, joiner) = split_wrap_tokens(text);
    let mut lines = Vec::new();
    let mut current = String::new();
    for token in tokens {
        let candidate = if current.is_empty() {
            token.clone()
        } else {
            format!("{current}{joiner}{token}")
        };
        if measure.text_width(&candidate, font_size) <= max_width {
            current = candidate;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = token;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub fn truncate_lines(lines: &mut Vec<String>, max_lines: Option<usize>) -> usize {
    let Some(max) = max_lines else {
        return 0;
    };
    let dropped = lines.len().saturating_sub(max);
    lines.truncate(max);
    dropped
}

/// Vertical offset of line `index` from the first baseline.
pub fn line_offset(index: usize, line_height: f32, direction: Direction) -> f32 {
    let offset = index as f32 * line_height;
    match direction {
        Direction::Up => offset,
        Direction::Down => -offset,
    }
}

/// Largest whole point size in `[trunc(min), trunc(max)]` whose width fits,
/// or `trunc(min)` when none does.
pub fn shrink_to_fit(
    text: &str,
    max_width: f32,
    max_size: f32,
    min_size: f32,
    measure: &dyn TextMeasure,
) -> f32 {
    let max_size = max_size.trunc() as i32;
    let min_size = min_size.trunc() as i32;
    if text.is_empty() {
        return max_size as f32;
    }
    let mut size = max_size;
    while size >= min_size {
        if measure.text_width(text, size as f32) <= max_width {
            return size as f32;
        }
        size -= 1;
    }
    min_size as f32
}

pub fn aligned_x(box_x: f32, box_width: f32, text_width: f32, align: Align) -> f32 {
    match align {
        Align::Left => box_x,
        Align::Right => box_x + box_width - text_width,
        Align::Center => box_x + (box_width - text_width) / 2.0,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Every character is `advance` em wide.
    pub(crate) struct FixedAdvance(pub f32);

    impl TextMeasure for FixedAdvance {
        fn text_width(&self, text: &str, font_size: f32) -> f32 {
            text.chars().count() as f32 * self.0 * font_size
        }
    }

    #[test]
    fn blank_sentinels_render_nothing() {
        for value in ["", "   ", "nan", "NaN", " None ", "null", "UNDEFINED"] {
            assert!(is_blank(value), "{value:?} should be blank");
        }
        assert!(!is_blank("Nancy"));
        assert!(!is_blank("0"));
        assert_eq!(normalize_value(Some("nan")), "");
        assert_eq!(normalize_value(None), "");
        assert_eq!(normalize_value(Some(" 张三 ")), " 张三 ");
    }

    #[test]
    fn tokens_follow_delimiter_priority() {
        assert_eq!(
            split_wrap_tokens("张三、李四， 王五"),
            (vec!["张三".to_string(), "李四， 王五".to_string()], "、")
        );
        assert_eq!(
            split_wrap_tokens("a, b,,c"),
            (vec!["a".to_string(), "b".to_string(), "c".to_string()], ", ")
        );
        assert_eq!(
            split_wrap_tokens(" Alice  Bob "),
            (vec!["Alice".to_string(), "Bob".to_string()], " ")
        );
        assert_eq!(split_wrap_tokens("单独"), (vec!["单独".to_string()], "、"));
        assert!(split_wrap_tokens("  ").0.is_empty());
    }

    #[test]
    fn wrap_respects_width_except_for_single_tokens() {
        let measure = FixedAdvance(1.0);
        let lines = wrap_lines("张三、李四、王五、赵六", 50.0, 10.0, &measure);
        assert_eq!(lines, vec!["张三、李四", "王五、赵六"]);
        for line in &lines {
            assert!(measure.text_width(line, 10.0) <= 50.0);
        }

        let lines = wrap_lines("一个非常非常长的名字、短", 30.0, 10.0, &measure);
        assert_eq!(lines, vec!["一个非常非常长的名字", "短"]);
    }

    #[test]
    fn wrap_terminates_on_overflowing_tokens() {
        let measure = FixedAdvance(1.0);
        let lines = wrap_lines("aaaa bbbb cccc", 1.0, 10.0, &measure);
        assert_eq!(lines, vec!["aaaa", "bbbb", "cccc"]);
        assert!(wrap_lines("", 100.0, 10.0, &measure).is_empty());
    }

    #[test]
    fn max_lines_truncates_silently() {
        let mut lines = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(truncate_lines(&mut lines, None), 0);
        assert_eq!(truncate_lines(&mut lines, Some(1)), 2);
        assert_eq!(lines, vec!["a"]);
    }

    #[test]
    fn line_offsets_follow_direction() {
        assert_eq!(line_offset(0, 15.0, Direction::Up), 0.0);
        assert_eq!(line_offset(2, 15.0, Direction::Up), 30.0);
        assert_eq!(line_offset(2, 15.0, Direction::Down), -30.0);
    }

    #[test]
    fn shrink_scans_integer_sizes() {
        let measure = FixedAdvance(1.0);
        // 4 chars: fits at 12 when width is 48.
        assert_eq!(shrink_to_fit("张三李四", 48.0, 24.9, 8.7, &measure), 12.0);
        // Nothing fits: the minimum is returned.
        assert_eq!(shrink_to_fit("张三李四", 1.0, 24.0, 8.7, &measure), 8.0);
        assert_eq!(shrink_to_fit("", 1.0, 24.5, 8.0, &measure), 24.0);
    }

    #[test]
    fn shrink_is_monotonic_in_width() {
        let measure = FixedAdvance(0.5);
        let text = "第十二届青少年机器人竞赛";
        let mut previous = 0.0;
        for width in (0..400).step_by(7) {
            let size = shrink_to_fit(text, width as f32, 30.0, 6.0, &measure);
            assert!(size >= previous, "width {width} gave {size} after {previous}");
            previous = size;
        }
    }

    #[test]
    fn alignment_positions_text_in_box() {
        assert_eq!(aligned_x(10.0, 100.0, 40.0, Align::Left), 10.0);
        assert_eq!(aligned_x(10.0, 100.0, 40.0, Align::Right), 70.0);
        assert_eq!(aligned_x(10.0, 100.0, 40.0, Align::Center), 40.0);
        // Overflowing text centers by going left of the box.
        assert_eq!(aligned_x(10.0, 100.0, 140.0, Align::Center), -10.0);
    }

    #[test]
    fn align_and_direction_parse_case_insensitively() {
        let align: Align = serde_json::from_str("\"RIGHT\"").expect("align");
        assert_eq!(align, Align::Right);
        let direction: Direction = serde_json::from_str("\"Down\"").expect("direction");
        assert_eq!(direction, Direction::Down);
        assert!(serde_json::from_str::<Align>("\"justify\"").is_err());
    }
}
