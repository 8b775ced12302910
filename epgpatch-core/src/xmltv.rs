//! XMLTV reading, channel filtering and guide serialisation.

use std::collections::BTreeMap;
use std::str;

use chrono::{Duration, NaiveDateTime};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::config::MergeConfig;
use crate::model::{ProgramEntry, format_xmltv};
use crate::ports::PortError;

const TAG_TV: &str = "tv";
const TAG_CHANNEL: &str = "channel";
const TAG_DISPLAY_NAME: &str = "display-name";
const TAG_PROGRAMME: &str = "programme";
const TAG_TITLE: &str = "title";
const ATTR_ID: &str = "id";
const ATTR_CHANNEL: &str = "channel";
const ATTR_START: &str = "start";
const ATTR_STOP: &str = "stop";
const ATTR_LANG: &str = "lang";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Owned XML element subtree.
pub struct XmlNode {
    /// Element name.
    pub name: String,
    /// Attributes in source order, unescaped.
    pub attributes: Vec<(String, String)>,
    /// Concatenated, unescaped text content directly inside the element.
    pub text: Option<String>,
    /// Child elements in source order.
    pub children: Vec<XmlNode>,
    /// Unescaped text following this element inside its parent.
    pub tail: Option<String>,
}

impl XmlNode {
    /// Create an empty element.
    #[must_use]
    pub fn element(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            tail: None,
        }
    }

    /// Append an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Set the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child element.
    #[must_use]
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Value of the first attribute named `key`.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, PortError> {
        let mut node = Self::element(String::from_utf8_lossy(start.name().as_ref()));
        for attribute in start.attributes() {
            let attribute = attribute?;
            node.attributes.push((
                String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
                attribute.unescape_value()?.into_owned(),
            ));
        }
        Ok(node)
    }

    // Text before the first child is the element's own; later runs trail the last child.
    fn push_text(&mut self, text: &str) {
        let slot = match self.children.last_mut() {
            Some(child) => &mut child.tail,
            None => &mut self.text,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    fn has_mixed_content(&self) -> bool {
        self.text.is_some() || self.children.iter().any(|child| child.tail.is_some())
    }
}

/// Read the `programme` elements that are direct children of the baseline root, in order.
///
/// # Errors
///
/// Returns [`PortError::MalformedXml`] for empty or truncated input, text outside the
/// root element, and bytes that are not UTF-8 (documents in other encodings are not
/// transcoded), and [`PortError::Xml`]/[`PortError::XmlAttribute`] for syntax errors.
pub fn read_programmes(document: &[u8]) -> Result<Vec<XmlNode>, PortError> {
    let text = str::from_utf8(document)
        .map_err(|err| PortError::MalformedXml(format!("baseline is not UTF-8: {err}")))?;

    let mut reader = Reader::from_str(text);

    // Open elements below the root; the root itself is only tracked by `depth`.
    let mut open: Vec<XmlNode> = Vec::new();
    let mut depth = 0_usize;
    let mut seen_root = false;
    let mut programmes = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if depth == 0 && seen_root {
                    return Err(PortError::MalformedXml("multiple root elements".to_owned()));
                }
                if depth > 0 {
                    open.push(XmlNode::from_start(&start)?);
                }
                seen_root = true;
                depth += 1;
            }
            Event::Empty(start) => {
                if depth == 0 {
                    if seen_root {
                        return Err(PortError::MalformedXml("multiple root elements".to_owned()));
                    }
                    seen_root = true;
                    continue;
                }
                attach(XmlNode::from_start(&start)?, &mut open, &mut programmes);
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if let Some(node) = open.pop() {
                    attach(node, &mut open, &mut programmes);
                }
            }
            Event::Text(content) => {
                let content = content.unescape()?;
                if !content.trim().is_empty() {
                    place_text(&content, depth, &mut open)?;
                }
            }
            Event::CData(content) => {
                place_text(&String::from_utf8_lossy(&content), depth, &mut open)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
    }

    if !seen_root {
        return Err(PortError::MalformedXml("baseline has no root element".to_owned()));
    }
    if depth > 0 {
        return Err(PortError::MalformedXml(format!(
            "baseline ends with {depth} unclosed element(s)"
        )));
    }
    Ok(programmes)
}

// Whitespace-only runs are layout and have been dropped by the caller.
fn place_text(text: &str, depth: usize, open: &mut [XmlNode]) -> Result<(), PortError> {
    if depth == 0 {
        return Err(PortError::MalformedXml("text outside root element".to_owned()));
    }
    if let Some(node) = open.last_mut() {
        node.push_text(text);
    }
    Ok(())
}

// Closed nodes either become children of the enclosing element or, directly under
// the root, candidate programmes.
fn attach(node: XmlNode, open: &mut [XmlNode], programmes: &mut Vec<XmlNode>) {
    if let Some(parent) = open.last_mut() {
        parent.children.push(node);
    } else if node.name == TAG_PROGRAMME {
        programmes.push(node);
    }
}

/// Stop times for a sorted schedule: each programme ends where the next begins, the
/// last one after `fallback`.
#[must_use]
pub fn derive_stops(entries: &[ProgramEntry], fallback: Duration) -> Vec<NaiveDateTime> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            entries
                .get(index + 1)
                .map_or(entry.start + fallback, |next| next.start)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Programmes grouped per channel id, always iterated in lexicographic id order.
pub struct ChannelSchedule {
    channels: BTreeMap<String, Vec<XmlNode>>,
}

impl ChannelSchedule {
    /// Start with an empty programme list for every whitelisted channel.
    #[must_use]
    pub fn with_whitelist<S: AsRef<str>>(whitelist: &[S]) -> Self {
        Self {
            channels: whitelist
                .iter()
                .map(|id| (id.as_ref().to_owned(), Vec::new()))
                .collect(),
        }
    }

    /// Append a baseline programme if its channel is already present. Returns whether it was kept.
    pub fn retain(&mut self, programme: XmlNode) -> bool {
        let Some(list) = programme
            .attr(ATTR_CHANNEL)
            .and_then(|channel| self.channels.get_mut(channel))
        else {
            return false;
        };
        list.push(programme);
        true
    }

    /// Set `channel` to exactly `programmes`, replacing anything kept earlier.
    pub fn replace(&mut self, channel: impl Into<String>, programmes: Vec<XmlNode>) {
        self.channels.insert(channel.into(), programmes);
    }

    /// Channels with their programmes, sorted by id.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &[XmlNode])> {
        self.channels
            .iter()
            .map(|(id, programmes)| (id.as_str(), programmes.as_slice()))
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Counters describing a merge.
pub struct MergeStats {
    /// Baseline programmes kept because their channel is whitelisted.
    pub kept: usize,
    /// Baseline programmes dropped.
    pub dropped: usize,
    /// Programmes injected for the scraped channel.
    pub injected: usize,
}

/// Merges scraped programmes into a baseline guide according to [`MergeConfig`].
#[derive(Debug, Clone)]
pub struct EpgMerger {
    config: MergeConfig,
    fallback: Duration,
}

impl EpgMerger {
    /// Create a merger for the given rules.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidConfig`] if `fallback_minutes` is out of range.
    pub fn new(config: MergeConfig) -> Result<Self, PortError> {
        let fallback = config.fallback()?;
        Ok(Self { config, fallback })
    }

    /// Filter the baseline by whitelist and inject `programs` (sorted by start).
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the baseline is not well-formed XML.
    pub fn merge(
        &self,
        baseline: &[u8],
        programs: &[ProgramEntry],
    ) -> Result<(ChannelSchedule, MergeStats), PortError> {
        let mut schedule = ChannelSchedule::with_whitelist(&self.config.whitelist);
        let mut stats = MergeStats::default();

        for programme in read_programmes(baseline)? {
            if schedule.retain(programme) {
                stats.kept += 1;
            } else {
                stats.dropped += 1;
            }
        }

        let injected = self.programme_nodes(programs);
        stats.injected = injected.len();
        schedule.replace(self.config.injected_channel.clone(), injected);

        debug!(?stats, "merged baseline guide");
        Ok((schedule, stats))
    }

    /// Build `programme` elements for the injected channel with derived stop times.
    #[must_use]
    pub fn programme_nodes(&self, programs: &[ProgramEntry]) -> Vec<XmlNode> {
        let stops = derive_stops(programs, self.fallback);
        programs
            .iter()
            .zip(stops)
            .map(|(entry, stop)| {
                XmlNode::element(TAG_PROGRAMME)
                    .with_attr(ATTR_CHANNEL, self.config.injected_channel.as_str())
                    .with_attr(ATTR_START, entry.start_formatted.as_str())
                    .with_attr(ATTR_STOP, format_xmltv(stop))
                    .with_child(
                        XmlNode::element(TAG_TITLE)
                            .with_attr(ATTR_LANG, self.config.lang.as_str())
                            .with_text(entry.title.as_str()),
                    )
            })
            .collect()
    }

    /// Serialise `schedule` as an indented XMLTV document.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the XML writer fails.
    pub fn render(&self, schedule: &ChannelSchedule) -> Result<Vec<u8>, PortError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new(TAG_TV)))?;

        for (id, programmes) in schedule.channels() {
            let channel = XmlNode::element(TAG_CHANNEL).with_attr(ATTR_ID, id).with_child(
                XmlNode::element(TAG_DISPLAY_NAME)
                    .with_attr(ATTR_LANG, self.config.lang.as_str())
                    .with_text(id),
            );
            write_node(&mut writer, &channel)?;
            for programme in programmes {
                write_node(&mut writer, programme)?;
            }
        }

        writer.write_event(Event::End(BytesEnd::new(TAG_TV)))?;
        let mut output = writer.into_inner();
        output.push(b'\n');
        Ok(output)
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), PortError> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.text.is_none() && node.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    // Text events suppress the writer's indentation, so mixed content is written
    // back without added whitespace.
    let mixed = node.has_mixed_content();
    writer.write_event(Event::Start(start))?;
    if mixed {
        let text = node.text.as_deref().unwrap_or_default();
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
        if mixed {
            let tail = child.tail.as_deref().unwrap_or_default();
            writer.write_event(Event::Text(BytesText::new(tail)))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
    Ok(())
}
