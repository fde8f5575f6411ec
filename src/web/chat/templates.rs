use clap::ValueEnum;

/// Single-turn prompt wrapping for the model families we serve.
///
/// Each template wraps the raw user prompt in the markers the model was
/// fine-tuned on and knows which markers mean the turn is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PromptTemplate {
    /// Phi-3 instruct: `<|user|>` / `<|end|>` / `<|assistant|>`
    #[default]
    #[value(name = "phi3")]
    Phi3,
    /// Qwen and other ChatML models
    #[value(name = "chatml")]
    ChatMl,
    #[value(name = "llama3")]
    Llama3,
    #[value(name = "mistral")]
    Mistral,
    #[value(name = "gemma")]
    Gemma,
}

struct TurnMarkers {
    user_open: &'static str,
    user_close: &'static str,
    assistant_open: &'static str,
    stops: &'static [&'static str],
}

impl PromptTemplate {
    fn markers(self) -> TurnMarkers {
        match self {
            PromptTemplate::Phi3 => TurnMarkers {
                user_open: "<|user|>\n",
                user_close: "<|end|>\n",
                assistant_open: "<|assistant|>\n",
                stops: &["<|end|>", "<|user|>"],
            },
            PromptTemplate::ChatMl => TurnMarkers {
                user_open: "<|im_start|>user\n",
                user_close: "<|im_end|>\n",
                assistant_open: "<|im_start|>assistant\n",
                stops: &["<|im_end|>", "<|im_start|>"],
            },
            PromptTemplate::Llama3 => TurnMarkers {
                user_open: "<|start_header_id|>user<|end_header_id|>\n\n",
                user_close: "<|eot_id|>",
                assistant_open: "<|start_header_id|>assistant<|end_header_id|>\n\n",
                stops: &["<|eot_id|>", "<|start_header_id|>"],
            },
            // Mistral has no assistant opener, the reply follows [/INST]
            PromptTemplate::Mistral => TurnMarkers {
                user_open: "[INST] ",
                user_close: " [/INST]",
                assistant_open: "",
                stops: &["</s>", "[INST]"],
            },
            PromptTemplate::Gemma => TurnMarkers {
                user_open: "<start_of_turn>user\n",
                user_close: "<end_of_turn>\n",
                assistant_open: "<start_of_turn>model\n",
                stops: &["<end_of_turn>", "<start_of_turn>"],
            },
        }
    }

    /// Wrap `prompt` as one user turn followed by an open assistant turn.
    pub fn format(self, prompt: &str) -> String {
        let m = self.markers();
        format!("{}{}{}{}", m.user_open, prompt, m.user_close, m.assistant_open)
    }

    pub fn stop_sequences(self) -> Vec<String> {
        self.markers().stops.iter().map(|s| s.to_string()).collect()
    }
}
