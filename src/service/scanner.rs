// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Thinking/answer stream scanner
//!
//! Splits a token stream on `<thinking>`/`</thinking>` delimiters with a
//! two-state machine. Delimiter matching is stateful across chunk
//! boundaries: a tag split over two deltas is held back until it can be
//! classified, never mis-emitted.

/// Classified output from the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Thinking(String),
    Answer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Thinking,
    Answer,
}

const OPEN_TAG: &str = "<thinking>";
const CLOSE_TAG: &str = "</thinking>";

/// Stateful scanner over streamed text deltas
#[derive(Debug)]
pub struct ThinkingScanner {
    state: ScanState,
    /// Unclassified tail, at most one partial delimiter long
    buffer: String,
}

impl ThinkingScanner {
    /// Scanner that starts in answer mode (tags switch it over)
    pub fn new() -> Self {
        Self {
            state: ScanState::Answer,
            buffer: String::new(),
        }
    }

    /// Scanner for modules whose prompts open with a thinking section
    pub fn starting_in_thinking() -> Self {
        Self {
            state: ScanState::Thinking,
            buffer: String::new(),
        }
    }

    fn current_delimiter(&self) -> &'static str {
        match self.state {
            ScanState::Thinking => CLOSE_TAG,
            ScanState::Answer => OPEN_TAG,
        }
    }

    fn emit(&self, text: String) -> ScanEvent {
        match self.state {
            ScanState::Thinking => ScanEvent::Thinking(text),
            ScanState::Answer => ScanEvent::Answer(text),
        }
    }

    /// Length of the longest buffer suffix that could still grow into the
    /// current delimiter
    fn partial_delimiter_len(&self) -> usize {
        let delimiter = self.current_delimiter();
        let max = (delimiter.len() - 1).min(self.buffer.len());
        for len in (1..=max).rev() {
            if !self.buffer.is_char_boundary(self.buffer.len() - len) {
                continue;
            }
            if delimiter.starts_with(&self.buffer[self.buffer.len() - len..]) {
                return len;
            }
        }
        0
    }

    /// Feed one chunk; returns the text that can be classified so far.
    pub fn push(&mut self, chunk: &str) -> Vec<ScanEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        loop {
            let delimiter = self.current_delimiter();
            match self.buffer.find(delimiter) {
                Some(pos) => {
                    if pos > 0 {
                        let text = self.buffer[..pos].to_string();
                        events.push(self.emit(text));
                    }
                    self.buffer.drain(..pos + delimiter.len());
                    self.state = match self.state {
                        ScanState::Thinking => ScanState::Answer,
                        ScanState::Answer => ScanState::Thinking,
                    };
                }
                None => {
                    // Hold back anything that might be a split tag
                    let hold = self.partial_delimiter_len();
                    let release = self.buffer.len() - hold;
                    if release > 0 {
                        let text: String = self.buffer.drain(..release).collect();
                        events.push(self.emit(text));
                    }
                    break;
                }
            }
        }

        events
    }

    /// Flush whatever is left; an unclosed section keeps its current state.
    pub fn finish(mut self) -> Vec<ScanEvent> {
        if self.buffer.is_empty() {
            return vec![];
        }
        let text = std::mem::take(&mut self.buffer);
        vec![self.emit(text)]
    }
}

impl Default for ThinkingScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scanner: &mut ThinkingScanner, chunks: &[&str]) -> (String, String) {
        let mut thinking = String::new();
        let mut answer = String::new();
        let mut collect = |events: Vec<ScanEvent>| {
            for event in events {
                match event {
                    ScanEvent::Thinking(t) => thinking.push_str(&t),
                    ScanEvent::Answer(t) => answer.push_str(&t),
                }
            }
        };
        for chunk in chunks {
            collect(scanner.push(chunk));
        }
        let finished = std::mem::take(scanner);
        collect(finished.finish());
        (thinking, answer)
    }

    #[test]
    fn test_plain_answer_untouched() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) = run(
            &mut scanner,
            &["Just a regular response ", "with no thinking tags."],
        );
        assert!(thinking.is_empty());
        assert_eq!(answer, "Just a regular response with no thinking tags.");
    }

    #[test]
    fn test_leading_thinking_section() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) = run(
            &mut scanner,
            &["<thinking>Let me think about this.", " continues here.</thinking> Then response."],
        );
        assert_eq!(thinking, "Let me think about this. continues here.");
        assert_eq!(answer, " Then response.");
    }

    #[test]
    fn test_thinking_mid_response() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) = run(
            &mut scanner,
            &[
                "Here is my response. <thinking>",
                "This is my thinking process.",
                "</thinking> And my conclusion.",
            ],
        );
        assert_eq!(thinking, "This is my thinking process.");
        assert_eq!(answer, "Here is my response.  And my conclusion.");
    }

    #[test]
    fn test_multiple_thinking_sections() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) = run(
            &mut scanner,
            &[
                "<thinking>Start Think 1",
                "111</thinking> Then response.",
                "<thinking>Continue Think 2",
                "222</thinking>.",
            ],
        );
        assert_eq!(thinking, "Start Think 1111Continue Think 2222");
        assert_eq!(answer, " Then response..");
    }

    #[test]
    fn test_open_tag_split_across_chunks() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) =
            run(&mut scanner, &["Start <think", "ing>inner</think", "ing>."]);
        assert_eq!(thinking, "inner");
        assert_eq!(answer, "Start .");
    }

    #[test]
    fn test_close_tag_split_one_char_at_a_time() {
        let mut scanner = ThinkingScanner::new();
        let chunks: Vec<String> = "<thinking>deep</thinking>out"
            .chars()
            .map(|c| c.to_string())
            .collect();
        let refs: Vec<&str> = chunks.iter().map(|s| s.as_str()).collect();
        let (thinking, answer) = run(&mut scanner, &refs);
        assert_eq!(thinking, "deep");
        assert_eq!(answer, "out");
    }

    #[test]
    fn test_unclosed_thinking_stays_thinking() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) = run(
            &mut scanner,
            &[
                "<thinking> This is my thinking process",
                " that never gets closed.",
                "Here is my response.",
            ],
        );
        assert_eq!(
            thinking,
            " This is my thinking process that never gets closed.Here is my response."
        );
        assert!(answer.is_empty());
    }

    #[test]
    fn test_starting_in_thinking_mode() {
        let mut scanner = ThinkingScanner::starting_in_thinking();
        let (thinking, answer) = run(
            &mut scanner,
            &["reasoning first", "</thinking>then the reply"],
        );
        assert_eq!(thinking, "reasoning first");
        assert_eq!(answer, "then the reply");
    }

    #[test]
    fn test_lone_angle_bracket_not_swallowed() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) = run(&mut scanner, &["a < b and a <t", "ag> c"]);
        assert!(thinking.is_empty());
        assert_eq!(answer, "a < b and a <tag> c");
    }

    #[test]
    fn test_partial_tag_at_stream_end_flushed() {
        let mut scanner = ThinkingScanner::new();
        let (thinking, answer) = run(&mut scanner, &["trailing <think"]);
        assert!(thinking.is_empty());
        assert_eq!(answer, "trailing <think");
    }

    // Arbitrary re-chunkings must classify identically to the whole string
    proptest::proptest! {
        #[test]
        fn prop_chunking_invariant(cuts in proptest::collection::vec(0usize..60, 0..6)) {
            let text = "pre <thinking>alpha</thinking> mid <thinking>beta</thinking> post";

            let mut reference = ThinkingScanner::new();
            let mut reference_events = reference.push(text);
            reference_events.extend(reference.finish());
            let mut expected_thinking = String::new();
            let mut expected_answer = String::new();
            for event in reference_events {
                match event {
                    ScanEvent::Thinking(t) => expected_thinking.push_str(&t),
                    ScanEvent::Answer(t) => expected_answer.push_str(&t),
                }
            }

            let mut boundaries: Vec<usize> =
                cuts.into_iter().map(|c| c.min(text.len())).collect();
            boundaries.sort_unstable();
            boundaries.dedup();

            let mut scanner = ThinkingScanner::new();
            let mut thinking = String::new();
            let mut answer = String::new();
            let mut start = 0;
            for boundary in boundaries.into_iter().chain(std::iter::once(text.len())) {
                if boundary <= start {
                    continue;
                }
                for event in scanner.push(&text[start..boundary]) {
                    match event {
                        ScanEvent::Thinking(t) => thinking.push_str(&t),
                        ScanEvent::Answer(t) => answer.push_str(&t),
                    }
                }
                start = boundary;
            }
            for event in scanner.finish() {
                match event {
                    ScanEvent::Thinking(t) => thinking.push_str(&t),
                    ScanEvent::Answer(t) => answer.push_str(&t),
                }
            }

            proptest::prop_assert_eq!(thinking, expected_thinking);
            proptest::prop_assert_eq!(answer, expected_answer);
        }
    }
}
