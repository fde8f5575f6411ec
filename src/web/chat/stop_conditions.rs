// Stop sequence detection for token-by-token generation

/// Result of feeding one decoded piece into a [`StopScanner`]
#[derive(Debug, PartialEq)]
pub struct StopConditionResult {
    /// Text that can be released to the caller.
    pub emit: String,
    /// Whether generation should stop
    pub should_stop: bool,
    /// Stop sequence that triggered the stop
    pub matched_token: Option<String>,
}

impl StopConditionResult {
    fn proceed(emit: String) -> Self {
        Self {
            emit,
            should_stop: false,
            matched_token: None,
        }
    }

    fn stop_now(emit: String, matched: String) -> Self {
        Self {
            emit,
            should_stop: true,
            matched_token: Some(matched),
        }
    }
}

/// Watches generated text for stop sequences.
///
/// Text that could still turn into a stop sequence is held back until the
/// next piece settles it, so a stop split across several tokens is never
/// leaked to the caller and is never part of the final output.
#[derive(Debug)]
pub struct StopScanner {
    stop_tokens: Vec<String>,
    pending: String,
}

impl StopScanner {
    pub fn new(stop_tokens: &[String]) -> Self {
        Self {
            stop_tokens: stop_tokens
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            pending: String::new(),
        }
    }

    pub fn push(&mut self, piece: &str) -> StopConditionResult {
        self.pending.push_str(piece);

        // Earliest complete match wins
        let first_match = self
            .stop_tokens
            .iter()
            .filter_map(|stop| self.pending.find(stop.as_str()).map(|pos| (pos, stop)))
            .min_by_key(|(pos, _)| *pos);

        if let Some((pos, stop)) = first_match {
            let stop = stop.clone();
            let emit = self.pending[..pos].to_string();
            self.pending.clear();
            return StopConditionResult::stop_now(emit, stop);
        }

        let held = self.partial_suffix_len();
        let split_at = self.pending.len() - held;
        let emit = self.pending[..split_at].to_string();
        self.pending.drain(..split_at);
        StopConditionResult::proceed(emit)
    }

    /// Release whatever was held back once generation ends without a stop.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }

    /// Length of the longest tail of `pending` that is a proper prefix of a
    /// stop sequence.
    fn partial_suffix_len(&self) -> usize {
        self.stop_tokens
            .iter()
            .filter_map(|stop| {
                (1..stop.len())
                    .rev()
                    .filter(|&i| stop.is_char_boundary(i))
                    .find(|&i| self.pending.ends_with(&stop[..i]))
            })
            .max()
            .unwrap_or(0)
    }
}
