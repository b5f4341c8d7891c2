//! Decoder for frames pushed by the streaming chat endpoint.
//!
//! A frame may embed a reasoning block between [`THINK_START`] and
//! [`THINK_END`] and may carry a bracketed completion marker (`[completed]` or
//! `[done]`, any case). Decoding never fails: marker-free or malformed input
//! yields the whole frame as response text.

/// Opening marker of a reasoning block.
pub const THINK_START: &str = "<think>";
/// Closing marker of a reasoning block.
pub const THINK_END: &str = "</think>";

/// Completion markers, lowercase; matched ASCII case-insensitively.
const COMPLETION_MARKERS: [&str; 2] = ["[completed]", "[done]"];

/// Structured result of decoding one frame.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedDelta {
    /// Text found between the first think marker pair, if both were present.
    pub think_segment: Option<String>,
    /// User-visible text with the completion marker removed.
    pub response_segment: String,
    /// Whether the frame carried a completion marker.
    pub is_completed: bool,
}

impl ParsedDelta {
    /// Delta carrying plain response text.
    #[must_use]
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            think_segment: None,
            response_segment: text.into(),
            is_completed: false,
        }
    }
}

/// Decode one raw text frame.
#[must_use]
pub fn decode_frame(frame: &str) -> ParsedDelta {
    let (think_segment, candidate) = split_think(frame);
    let (response_segment, is_completed) = strip_completion(candidate);
    ParsedDelta {
        think_segment: think_segment.map(str::to_string),
        response_segment,
        is_completed,
    }
}

/// Split off the first `<think>...</think>` block.
///
/// Returns the think text and the remainder after the end marker. When the
/// end marker precedes the start marker the pair is not well formed and the
/// frame is returned untouched.
fn split_think(frame: &str) -> (Option<&str>, &str) {
    let Some(start) = frame.find(THINK_START) else {
        return (None, frame);
    };
    let body_start = start + THINK_START.len();
    let Some(end_offset) = frame[body_start..].find(THINK_END) else {
        return (None, frame);
    };
    let body_end = body_start + end_offset;
    (
        Some(&frame[body_start..body_end]),
        &frame[body_end + THINK_END.len()..],
    )
}

/// Splice out the first completion marker.
fn strip_completion(candidate: &str) -> (String, bool) {
    // ASCII lowercasing keeps every byte offset valid for `candidate`.
    let lowered = candidate.to_ascii_lowercase();
    let found = COMPLETION_MARKERS
        .iter()
        .filter_map(|marker| lowered.find(marker).map(|start| (start, marker.len())))
        .min_by_key(|&(start, _)| start);
    match found {
        Some((start, len)) => {
            let mut out = String::with_capacity(candidate.len() - len);
            out.push_str(&candidate[..start]);
            out.push_str(&candidate[start + len..]);
            (out, true)
        }
        None => (candidate.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_frame_is_response() {
        let frame = "hello world";
        assert_eq!(decode_frame(frame), ParsedDelta::response(frame));
    }

    #[test]
    fn test_empty_frame() {
        assert_eq!(decode_frame(""), ParsedDelta::default());
    }

    #[test]
    fn test_think_and_done() {
        let delta = decode_frame("<think>A</think>B[done]");
        assert_eq!(delta.think_segment.as_deref(), Some("A"));
        assert_eq!(delta.response_segment, "B");
        assert!(delta.is_completed);
    }

    #[test]
    fn test_completion_is_case_insensitive() {
        let delta = decode_frame("hello[COMPLETED]");
        assert_eq!(delta.response_segment, "hello");
        assert!(delta.is_completed);
        assert!(delta.think_segment.is_none());
    }

    #[test]
    fn test_completion_marker_is_spliced_not_blanked() {
        let delta = decode_frame("before [Done] after");
        assert_eq!(delta.response_segment, "before  after");
        assert!(delta.is_completed);
    }

    #[test]
    fn test_missing_end_marker_keeps_frame() {
        let delta = decode_frame("<think>still thinking");
        assert!(delta.think_segment.is_none());
        assert_eq!(delta.response_segment, "<think>still thinking");
        assert!(!delta.is_completed);
    }

    #[test]
    fn test_missing_start_marker_keeps_frame() {
        let delta = decode_frame("tail</think>answer");
        assert!(delta.think_segment.is_none());
        assert_eq!(delta.response_segment, "tail</think>answer");
    }

    #[test]
    fn test_only_first_think_pair_is_extracted() {
        let delta = decode_frame("<think>one</think>x<think>two</think>y");
        assert_eq!(delta.think_segment.as_deref(), Some("one"));
        assert_eq!(delta.response_segment, "x<think>two</think>y");
    }

    #[test]
    fn test_text_before_think_block_is_dropped() {
        let delta = decode_frame("lead<think>t</think>r");
        assert_eq!(delta.think_segment.as_deref(), Some("t"));
        assert_eq!(delta.response_segment, "r");
    }

    #[test]
    fn test_marker_inside_think_block_does_not_complete() {
        let delta = decode_frame("<think>[done]</think>ok");
        assert_eq!(delta.think_segment.as_deref(), Some("[done]"));
        assert_eq!(delta.response_segment, "ok");
        assert!(!delta.is_completed);
    }

    #[test]
    fn test_unbracketed_keyword_is_text() {
        let delta = decode_frame("we are done");
        assert!(!delta.is_completed);
        assert_eq!(delta.response_segment, "we are done");
    }

    #[test]
    fn test_multibyte_text_survives() {
        let delta = decode_frame("<think>思考</think>你好[completed]");
        assert_eq!(delta.think_segment.as_deref(), Some("思考"));
        assert_eq!(delta.response_segment, "你好");
        assert!(delta.is_completed);
    }

    #[test]
    fn test_mixed_case_marker_after_multibyte_text() {
        let delta = decode_frame("答案[CoMpLeTeD]");
        assert_eq!(delta.response_segment, "答案");
        assert!(delta.is_completed);
    }

    #[test]
    fn test_earliest_marker_is_removed() {
        let delta = decode_frame("a[DONE]b[completed]");
        assert_eq!(delta.response_segment, "ab[completed]");
        assert!(delta.is_completed);
    }
}
