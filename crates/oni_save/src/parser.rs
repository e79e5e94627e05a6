//! Resumable parse driver
//!
//! `SaveParser` decodes a stream in bounded steps: the header, then one
//! framed section per step, then one object group per step. Each step hands
//! the parser back so the caller can inspect progress, keep going, or drop
//! it to cancel. Only a header failure is an error; every later problem is
//! recorded as a warning and the affected section is kept as bytes.

use std::ops::ControlFlow;

use crate::config::CodecConfig;
use crate::cursor::ByteReader;
use crate::document::{BlobSection, OpaqueBlob, SaveDocument, SaveHeader, Section};
use crate::error::{Result, SaveError};
use crate::framing::{read_frame, sha256_hex, unframe_section, SectionInfo, SectionKind, SectionStatus};
use crate::objects::{GroupWalk, ObjectDecoder};
use crate::template::TemplateRegistry;
use crate::version::VersionClass;

/// A finished parse.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub document: SaveDocument,
    /// Non-fatal problems, in the order they were found
    pub warnings: Vec<SaveError>,
    pub version: VersionClass,
}

impl ParseOutcome {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Where the parser currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Header,
    Section(SectionKind),
    ObjectGroups { decoded: usize, total: usize },
    Trailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    /// Next unread byte of the input
    pub offset: usize,
    pub total: usize,
}

pub enum Step<'a> {
    Continue(SaveParser<'a>),
    Done(ParseOutcome),
}

enum BodyStage {
    Section(SectionKind),
    /// `info_index` points at the game objects entry in `document.sections`
    ObjectGroups { walk: GroupWalk, info_index: usize },
    Trailer,
}

enum State {
    Header,
    Body { document: Box<SaveDocument>, at: BodyStage },
}

pub struct SaveParser<'a> {
    input: &'a [u8],
    config: &'a CodecConfig,
    pos: usize,
    state: State,
    truncated: bool,
    warnings: Vec<SaveError>,
    version: VersionClass,
}

fn after(kind: SectionKind) -> BodyStage {
    match kind.next() {
        Some(next) => BodyStage::Section(next),
        None => BodyStage::Trailer,
    }
}

impl<'a> SaveParser<'a> {
    pub fn new(input: &'a [u8], config: &'a CodecConfig) -> Self {
        Self {
            input,
            config,
            pos: 0,
            state: State::Header,
            truncated: false,
            warnings: Vec::new(),
            version: VersionClass::Supported,
        }
    }

    pub fn stage(&self) -> Stage {
        match &self.state {
            State::Header => Stage::Header,
            State::Body { at: BodyStage::Section(kind), .. } => Stage::Section(*kind),
            State::Body { at: BodyStage::ObjectGroups { walk, .. }, .. } => {
                Stage::ObjectGroups { decoded: walk.decoded(), total: walk.total() }
            }
            State::Body { at: BodyStage::Trailer, .. } => Stage::Trailer,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress { stage: self.stage(), offset: self.pos, total: self.input.len() }
    }

    /// Sections finished so far.
    pub fn completed_sections(&self) -> &[SectionInfo] {
        match &self.state {
            State::Header => &[],
            State::Body { document, .. } => &document.sections,
        }
    }

    pub fn warnings(&self) -> &[SaveError] {
        &self.warnings
    }

    /// Perform one bounded unit of work.
    pub fn step(mut self) -> Result<Step<'a>> {
        let state = std::mem::replace(&mut self.state, State::Header);
        let (document, next) = match state {
            State::Header => (Box::new(self.read_header()?), BodyStage::Section(SectionKind::Templates)),
            State::Body { mut document, at } => {
                let next = match at {
                    BodyStage::Section(kind) => self.read_section(&mut document, kind),
                    BodyStage::ObjectGroups { walk, info_index } => {
                        self.read_group(&mut document, walk, info_index)
                    }
                    BodyStage::Trailer => {
                        document.trailing = self.input[self.pos..].to_vec();
                        self.pos = self.input.len();
                        return Ok(Step::Done(ParseOutcome {
                            document: *document,
                            warnings: self.warnings,
                            version: self.version,
                        }));
                    }
                };
                (document, next)
            }
        };
        self.state = State::Body { document, at: next };
        Ok(Step::Continue(self))
    }

    /// Run the remaining steps.
    pub fn finish(self) -> Result<ParseOutcome> {
        let mut parser = self;
        loop {
            match parser.step()? {
                Step::Continue(next) => parser = next,
                Step::Done(outcome) => return Ok(outcome),
            }
        }
    }

    fn warn(&mut self, error: SaveError) {
        log::warn!("{}", error);
        self.warnings.push(error);
    }

    fn read_header(&mut self) -> Result<SaveDocument> {
        let mut r = ByteReader::new(self.input);
        let header = SaveHeader::read(&mut r)?;
        self.pos = r.position();

        if let Some(error) = header.info_error() {
            self.warn(error.clone());
        }
        if let Some(error) = self.config.version_policy.check(header.major(), header.minor()) {
            self.version = VersionClass::OutOfRange;
            self.warnings.push(error);
        }
        log::debug!(
            "Save {} header v{} compressed={} ({} bytes)",
            header.version_string(),
            header.header_version(),
            header.is_compressed(),
            self.pos
        );

        let mut document = SaveDocument::new(header);
        document.templates = Section::Missing;
        document.world = BlobSection::Missing;
        document.settings = BlobSection::Missing;
        document.sim = BlobSection::Missing;
        document.game_objects = Section::Missing;
        document.game_data = BlobSection::Missing;
        Ok(document)
    }

    fn read_section(&mut self, document: &mut SaveDocument, kind: SectionKind) -> BodyStage {
        let input: &'a [u8] = self.input;
        let mut r = ByteReader::with_base(&input[self.pos..], self.pos);
        let frame = match read_frame(&mut r) {
            Ok(frame) => frame,
            Err(error) => {
                // Only the first missing section is worth a warning
                if !self.truncated {
                    self.truncated = true;
                    self.warn(error);
                }
                document.sections.push(SectionInfo::missing(kind, self.pos));
                self.pos = self.input.len();
                return after(kind);
            }
        };
        self.pos = r.offset();

        let compressed = document.header.is_compressed();
        let mut info = SectionInfo {
            kind,
            offset: frame.offset,
            physical_len: frame.physical.len(),
            logical_len: None,
            sha256: None,
            status: SectionStatus::Unreadable,
        };
        let logical = match unframe_section(frame.physical, compressed, self.config.max_section_size) {
            Ok(logical) => logical,
            Err(error) => {
                self.warn(error.in_section(kind));
                let blob = OpaqueBlob::new(frame.physical.to_vec());
                match kind {
                    SectionKind::Templates => document.templates = Section::Unreadable(blob),
                    SectionKind::GameObjects => document.game_objects = Section::Unreadable(blob),
                    _ => set_blob(document, kind, BlobSection::Unreadable(blob)),
                }
                document.sections.push(info);
                return after(kind);
            }
        };
        info.logical_len = Some(logical.len());
        info.sha256 = Some(sha256_hex(&logical));
        info.status = SectionStatus::Opaque;

        // Offsets inside a compressed section are relative to its logical bytes
        let base = if compressed { 0 } else { frame.data_offset };
        match kind {
            SectionKind::Templates => match TemplateRegistry::load(&logical, base) {
                Ok(registry) => {
                    log::debug!("Loaded {} type templates", registry.len());
                    document.templates = Section::Decoded(registry);
                    info.status = SectionStatus::Decoded;
                }
                Err(error) => {
                    self.warn(error.in_section(kind));
                    document.templates = Section::Opaque(OpaqueBlob::new(logical));
                }
            },
            SectionKind::GameObjects => {
                let empty = TemplateRegistry::new();
                let registry = document.registry().unwrap_or(&empty);
                let decoder = ObjectDecoder::new(registry, self.config.max_template_depth);
                let mut walk = GroupWalk::new(logical, base);
                match walk.read_count(&decoder) {
                    Ok(_) => {
                        info.status = SectionStatus::Decoded;
                        document.sections.push(info);
                        let info_index = document.sections.len() - 1;
                        return self.finish_walk_if_done(document, walk, info_index);
                    }
                    Err(error) => {
                        self.warn(error.in_section(kind));
                        document.game_objects = Section::Opaque(OpaqueBlob::new(walk.into_bytes()));
                    }
                }
            }
            _ => set_blob(document, kind, BlobSection::Present(OpaqueBlob::new(logical))),
        }
        document.sections.push(info);
        after(kind)
    }

    fn read_group(&mut self, document: &mut SaveDocument, mut walk: GroupWalk, info_index: usize) -> BodyStage {
        let empty = TemplateRegistry::new();
        let registry = document.registry().unwrap_or(&empty);
        let decoder = ObjectDecoder::new(registry, self.config.max_template_depth);
        match walk.next_group(&decoder) {
            Ok(()) => self.finish_walk_if_done(document, walk, info_index),
            Err(error) => {
                // Component warnings refer to objects that are no longer kept
                self.warn(error.in_section(SectionKind::GameObjects));
                document.sections[info_index].status = SectionStatus::Opaque;
                document.game_objects = Section::Opaque(OpaqueBlob::new(walk.into_bytes()));
                after(SectionKind::GameObjects)
            }
        }
    }

    fn finish_walk_if_done(&mut self, document: &mut SaveDocument, walk: GroupWalk, info_index: usize) -> BodyStage {
        if !walk.is_done() {
            return BodyStage::ObjectGroups { walk, info_index };
        }
        let (objects, warnings) = walk.finish();
        self.warnings.extend(warnings);
        document.game_objects = Section::Decoded(objects);
        after(SectionKind::GameObjects)
    }
}

fn set_blob(document: &mut SaveDocument, kind: SectionKind, blob: BlobSection) {
    match kind {
        SectionKind::World => document.world = blob,
        SectionKind::Settings => document.settings = blob,
        SectionKind::Sim => document.sim = blob,
        SectionKind::GameData => document.game_data = blob,
        other => log::debug!("Ignoring blob for non-blob section {}", other),
    }
}

/// Parse with the default configuration.
pub fn parse(bytes: &[u8]) -> Result<ParseOutcome> {
    parse_with(bytes, &CodecConfig::default())
}

pub fn parse_with(bytes: &[u8], config: &CodecConfig) -> Result<ParseOutcome> {
    SaveParser::new(bytes, config).finish()
}

/// Parse while reporting progress after every step. Returning
/// `ControlFlow::Break` from the callback cancels and yields `Ok(None)`.
pub fn parse_with_progress<F>(bytes: &[u8], config: &CodecConfig, mut on_progress: F) -> Result<Option<ParseOutcome>>
where
    F: FnMut(&Progress) -> ControlFlow<()>,
{
    let mut parser = SaveParser::new(bytes, config);
    loop {
        match parser.step()? {
            Step::Continue(next) => {
                if on_progress(&next.progress()).is_break() {
                    log::info!("Parse cancelled at offset {}", next.progress().offset);
                    return Ok(None);
                }
                parser = next;
            }
            Step::Done(outcome) => return Ok(Some(outcome)),
        }
    }
}
