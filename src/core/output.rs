//! The output sink: a stack of named, visibility-tagged channels.
//!
//! Every run starts with a public `main` channel. Writes land in the channel
//! on top of the stack and fall through to the channels beneath it for as
//! long as the channel just written is public.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::format::{Capitalization, Capitalizer};

pub const MAIN_CHANNEL: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Writes also fall through to the channel below.
    #[default]
    Public,
    /// Writes stay in this channel; it still appears in the output.
    Private,
    /// Writes stay in this channel and it is omitted from the output.
    Internal,
}

impl Visibility {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

/// Named write targets and their current contents, shared by every sink of
/// a run.
pub type Targets = FxHashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Target(String),
}

#[derive(Debug, Clone)]
struct Channel {
    name: String,
    visibility: Visibility,
    segments: Vec<Segment>,
    caps: Capitalizer,
    /// Characters written, not counting target contents.
    written: usize,
}

impl Channel {
    fn new(name: &str, visibility: Visibility) -> Self {
        Self {
            name: name.to_string(),
            visibility,
            segments: Vec::new(),
            caps: Capitalizer::default(),
            written: 0,
        }
    }

    fn write(&mut self, text: &str) {
        let text = self.caps.apply(text);
        self.written += text.chars().count();
        match self.segments.last_mut() {
            Some(Segment::Text(last)) => last.push_str(&text),
            _ => self.segments.push(Segment::Text(text)),
        }
    }

    fn render(&self, targets: &Targets) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Target(name) => {
                    if let Some(value) = targets.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct OutputSink {
    /// Creation order.
    channels: Vec<Channel>,
    /// Indices into `channels`; the bottom is always `main`.
    stack: Vec<usize>,
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink {
    pub fn new() -> Self {
        Self {
            channels: vec![Channel::new(MAIN_CHANNEL, Visibility::Public)],
            stack: vec![0],
        }
    }

    fn active(&self) -> usize {
        self.stack.last().copied().unwrap_or(0)
    }

    /// Channel indices a write reaches, top first.
    fn write_path(&self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut seen = FxHashSet::default();
        for &index in self.stack.iter().rev() {
            if seen.insert(index) {
                path.push(index);
            }
            if self.channels[index].visibility != Visibility::Public {
                break;
            }
        }
        path
    }

    pub fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        for index in self.write_path() {
            self.channels[index].write(text);
        }
    }

    /// Place a placeholder for target `name` at the current position.
    pub fn place_target(&mut self, name: &str) {
        for index in self.write_path() {
            self.channels[index]
                .segments
                .push(Segment::Target(name.to_string()));
        }
    }

    /// Push channel `name`, creating it on first use. An existing channel
    /// keeps its contents and takes the new visibility.
    pub fn push_channel(&mut self, name: &str, visibility: Visibility) {
        let index = match self.channels.iter().position(|c| c.name == name) {
            Some(index) => {
                if index != 0 {
                    self.channels[index].visibility = visibility;
                }
                index
            }
            None => {
                self.channels.push(Channel::new(name, visibility));
                self.channels.len() - 1
            }
        };
        self.stack.push(index);
    }

    /// Pop the most recent push of `name`. Returns `false` if it is not open.
    /// The bottom `main` entry can never be closed.
    pub fn pop_channel(&mut self, name: &str) -> bool {
        let found = self
            .stack
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .find(|(_, &index)| self.channels[index].name == name)
            .map(|(slot, _)| slot);
        match found {
            Some(slot) => {
                self.stack.remove(slot);
                true
            }
            None => false,
        }
    }

    pub fn set_caps(&mut self, mode: Capitalization) {
        let index = self.active();
        self.channels[index].caps.mode = mode;
    }

    pub fn caps(&self) -> Capitalization {
        self.channels[self.active()].caps.mode
    }

    /// Characters written so far to the active channel.
    pub fn position(&self) -> usize {
        self.channels[self.active()].written
    }

    /// Rendered text of `main`.
    pub fn main_text(&self, targets: &Targets) -> String {
        self.channels[0].render(targets)
    }

    /// Replay this sink's contents into `parent`.
    ///
    /// `main` is written through the parent's active channel, so it picks up
    /// the parent's capitalization and visibility rules. Other channels are
    /// appended to the parent's channel of the same name.
    pub fn merge_into(self, parent: &mut OutputSink) {
        let mut channels = self.channels.into_iter();
        if let Some(main) = channels.next() {
            for segment in main.segments {
                match segment {
                    Segment::Text(text) => parent.write(&text),
                    Segment::Target(name) => parent.place_target(&name),
                }
            }
        }

        for channel in channels {
            let index = match parent.channels.iter().position(|c| c.name == channel.name) {
                Some(index) => index,
                None => {
                    parent
                        .channels
                        .push(Channel::new(&channel.name, channel.visibility));
                    parent.channels.len() - 1
                }
            };
            let target = &mut parent.channels[index];
            target.written += channel.written;
            target.segments.extend(channel.segments);
        }
    }

    /// Render every non-internal channel in creation order.
    pub fn finish(&self, targets: &Targets) -> Output {
        Output {
            channels: self
                .channels
                .iter()
                .filter(|c| c.visibility != Visibility::Internal)
                .map(|c| ChannelOutput {
                    name: c.name.clone(),
                    visibility: c.visibility,
                    text: c.render(targets),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutput {
    pub name: String,
    pub visibility: Visibility,
    pub text: String,
}

/// The result of a run: non-internal channels in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub channels: Vec<ChannelOutput>,
}

impl Output {
    pub fn main(&self) -> &str {
        self.get(MAIN_CHANNEL).unwrap_or("")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelOutput> {
        self.channels.iter()
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.main())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_channel_is_isolated() {
        let mut sink = OutputSink::new();
        sink.write("a");
        sink.push_channel("notes", Visibility::Private);
        sink.write("secret");
        assert!(sink.pop_channel("notes"));
        sink.write("b");

        let out = sink.finish(&Targets::default());
        assert_eq!(out.main(), "ab");
        assert_eq!(out.get("notes"), Some("secret"));
    }

    #[test]
    fn public_channel_falls_through() {
        let mut sink = OutputSink::new();
        sink.push_channel("echo", Visibility::Public);
        sink.write("hi");
        let out = sink.finish(&Targets::default());
        assert_eq!(out.main(), "hi");
        assert_eq!(out.get("echo"), Some("hi"));
    }

    #[test]
    fn internal_channels_are_hidden() {
        let mut sink = OutputSink::new();
        sink.push_channel("scratch", Visibility::Internal);
        sink.write("x");
        let out = sink.finish(&Targets::default());
        assert_eq!(out.channels.len(), 1);
        assert_eq!(out.main(), "");
    }

    #[test]
    fn main_cannot_be_closed() {
        let mut sink = OutputSink::new();
        assert!(!sink.pop_channel(MAIN_CHANNEL));
        assert!(!sink.pop_channel("missing"));
    }

    #[test]
    fn targets_render_in_place() {
        let mut sink = OutputSink::new();
        sink.write("[");
        sink.place_target("t");
        sink.write("]");
        let mut targets = Targets::default();
        targets.insert("t".into(), "filled".into());
        assert_eq!(sink.main_text(&targets), "[filled]");
        assert_eq!(sink.main_text(&Targets::default()), "[]");
    }

    #[test]
    fn merge_applies_parent_caps() {
        let mut parent = OutputSink::new();
        parent.set_caps(Capitalization::Upper);
        let mut child = OutputSink::new();
        child.write("quiet");
        child.push_channel("side", Visibility::Private);
        child.write("note");
        child.merge_into(&mut parent);

        let out = parent.finish(&Targets::default());
        assert_eq!(out.main(), "QUIET");
        assert_eq!(out.get("side"), Some("note"));
    }

    #[test]
    fn position_counts_chars() {
        let mut sink = OutputSink::new();
        sink.write("héllo");
        assert_eq!(sink.position(), 5);
    }
}
