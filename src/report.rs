//! Report composition and PDF layout.
//!
//! [`ReportComposer`] turns an extraction plus its aspect results into a
//! [`ReportDocument`], a layout-neutral list of sections, and hands it to a
//! [`LayoutRenderer`]. The default renderer, [`PdfLayout`], writes a plain
//! A4 PDF with the standard Helvetica fonts.
//!
//! Sections, in order:
//!
//! | Section  | Content                                                     |
//! |----------|-------------------------------------------------------------|
//! | header   | title, reading time, word count                             |
//! | Article  | the cleaned content, one block per paragraph                |
//! | Summary  | summary text, or a placeholder if the aspect failed         |
//! | Analysis | one entry per completed aspect, one note per omitted aspect |
//! | Source   | reference, input type, extraction method, word count        |
//!
//! A failed aspect never prevents the report; a renderer failure does.

use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::models::{
    AnalysisAggregate, Artifact, ArtifactKind, Aspect, AspectOutcome, BiasLevel, ExtractionResult,
    Verdict,
};

pub const SUMMARY_PLACEHOLDER: &str = "Summary unavailable.";
const WORDS_PER_MINUTE: usize = 225;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComposeError {
    #[error("layout failed: {0}")]
    Layout(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(String),
    /// Emphasized single line, e.g. a verdict label.
    Label(String),
    Bullet(String),
    /// De-emphasized small print.
    Note(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading: String,
    pub blocks: Vec<Block>,
}

/// Layout-neutral report content.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub title: String,
    pub byline: String,
    pub sections: Vec<Section>,
}

/// Turns a [`ReportDocument`] into bytes.
pub trait LayoutRenderer: Send + Sync {
    fn name(&self) -> &str;

    fn content_type(&self) -> &str {
        ArtifactKind::Report.content_type()
    }

    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ComposeError>;
}

pub struct ReportComposer {
    layout: Arc<dyn LayoutRenderer>,
}

impl ReportComposer {
    pub fn new(layout: Arc<dyn LayoutRenderer>) -> Self {
        Self { layout }
    }

    pub fn compose(
        &self,
        extraction: &ExtractionResult,
        aggregate: &AnalysisAggregate,
    ) -> Result<Artifact, ComposeError> {
        let doc = build_document(extraction, aggregate);
        let bytes = self.layout.render(&doc)?;
        tracing::debug!(
            layout = self.layout.name(),
            bytes = bytes.len(),
            sections = doc.sections.len(),
            "report rendered"
        );
        Ok(Artifact {
            kind: ArtifactKind::Report,
            title: doc.title,
            content_type: self.layout.content_type().to_string(),
            bytes,
            producer: self.layout.name().to_string(),
        })
    }
}

/// `ceil(words / 225)`, never less than one minute.
pub fn reading_minutes(word_count: usize) -> usize {
    word_count.div_ceil(WORDS_PER_MINUTE).max(1)
}

pub fn build_document(extraction: &ExtractionResult, aggregate: &AnalysisAggregate) -> ReportDocument {
    let title = if extraction.title.trim().is_empty() {
        "Untitled".to_string()
    } else {
        extraction.title.clone()
    };
    let byline = format!(
        "{} min read  |  {} words",
        reading_minutes(extraction.word_count),
        extraction.word_count
    );

    let mut sections = Vec::new();
    let article = article_blocks(&extraction.content);
    if !article.is_empty() {
        sections.push(Section {
            heading: "Article".to_string(),
            blocks: article,
        });
    }

    let summary = aggregate.summary_text().unwrap_or(SUMMARY_PLACEHOLDER);
    sections.push(Section {
        heading: "Summary".to_string(),
        blocks: vec![Block::Paragraph(summary.to_string())],
    });

    let mut analysis = Vec::new();
    for (aspect, result) in &aggregate.results {
        if *aspect == Aspect::Summary {
            continue;
        }
        match result.outcome() {
            Some(outcome) => analysis.extend(outcome_blocks(*aspect, outcome)),
            None => analysis.push(Block::Note(format!(
                "{} could not be completed and was omitted.",
                aspect.display_name()
            ))),
        }
    }
    if !analysis.is_empty() {
        sections.push(Section {
            heading: "Analysis".to_string(),
            blocks: analysis,
        });
    }

    sections.push(Section {
        heading: "Source".to_string(),
        blocks: vec![
            Block::Note(format!("Source: {}", extraction.source)),
            Block::Note(format!(
                "Input: {}  |  Method: {}  |  Words: {}",
                extraction.input_type, extraction.extraction_method, extraction.word_count
            )),
        ],
    });

    ReportDocument {
        title,
        byline,
        sections,
    }
}

/// Paragraphs split on blank lines; line breaks inside a paragraph become spaces.
fn article_blocks(content: &str) -> Vec<Block> {
    content
        .split("\n\n")
        .map(|para| {
            para.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|para| !para.is_empty())
        .map(Block::Paragraph)
        .collect()
}

fn outcome_blocks(aspect: Aspect, outcome: &AspectOutcome) -> Vec<Block> {
    let mut blocks = Vec::new();
    match outcome {
        AspectOutcome::Summary { text } => {
            blocks.push(Block::Label(aspect.display_name().to_string()));
            blocks.push(Block::Paragraph(text.clone()));
        }
        AspectOutcome::Verdict(v) => {
            blocks.push(Block::Label(format!(
                "{}: {} ({:.0}%)",
                aspect.display_name(),
                verdict_label(aspect, v),
                v.probability.positive.max(v.probability.negative) * 100.0
            )));
            if !v.notes.is_empty() {
                blocks.push(Block::Paragraph(v.notes.clone()));
            }
        }
        AspectOutcome::Bias(b) => {
            let level = match b.level {
                BiasLevel::None => "No significant bias detected",
                BiasLevel::Low => "Some bias detected",
                BiasLevel::High => "Strong bias detected",
            };
            blocks.push(Block::Label(format!("{}: {}", aspect.display_name(), level)));
            for label in &b.biases_above_cutoff {
                let score = b.bias_scores.get(label).copied().unwrap_or_default();
                blocks.push(Block::Bullet(format!(
                    "{} ({:.2})",
                    label.replace('_', " "),
                    score
                )));
            }
            if !b.notes.is_empty() {
                blocks.push(Block::Paragraph(b.notes.clone()));
            }
        }
    }
    blocks
}

fn verdict_label(aspect: Aspect, v: &Verdict) -> &'static str {
    match (aspect, v.flagged) {
        (Aspect::Scam, true) => "Suspicious",
        (Aspect::Scam, false) => "Safe",
        (_, true) => "Mostly subjective",
        (_, false) => "Mostly objective",
    }
}

/// Map text onto what the standard PDF fonts can show: typographic
/// punctuation becomes ASCII, anything else outside Latin-1 becomes `?`.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2022}' => out.push('*'),
            '\u{00A0}' | '\u{2009}' | '\u{200A}' | '\u{202F}' => out.push(' '),
            '\u{200B}' | '\u{FEFF}' => {}
            '\t' => out.push(' '),
            c if c.is_control() => {}
            c if (c as u32) <= 0xFF => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn latin1_bytes(text: &str) -> Vec<u8> {
    // Input has been through `sanitize`, so every char fits in one byte.
    text.chars().map(|c| c as u32 as u8).collect()
}

// ============ PDF layout ============

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const FOOTER_Y: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Line {
    text: String,
    font: Font,
    size: i64,
    indent: i64,
    /// Extra space above the line, in points.
    gap: i64,
}

/// A4 PDF writer on top of lopdf.
pub struct PdfLayout {
    footer: String,
}

impl Default for PdfLayout {
    fn default() -> Self {
        Self {
            footer: "Clearview".to_string(),
        }
    }
}

impl PdfLayout {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self, doc: &ReportDocument) -> Vec<Line> {
        let mut lines = Vec::new();
        push_wrapped(&mut lines, &doc.title, Font::Bold, 20, 0, 0);
        push_wrapped(&mut lines, &doc.byline, Font::Italic, 10, 0, 6);

        for section in &doc.sections {
            push_wrapped(&mut lines, &section.heading, Font::Bold, 14, 0, 18);
            for block in &section.blocks {
                match block {
                    Block::Paragraph(text) => {
                        for para in text.split("\n\n") {
                            push_wrapped(&mut lines, para, Font::Regular, 11, 0, 6);
                        }
                    }
                    Block::Label(text) => push_wrapped(&mut lines, text, Font::Bold, 11, 0, 8),
                    Block::Bullet(text) => {
                        push_wrapped(&mut lines, &format!("- {}", text), Font::Regular, 11, 12, 2)
                    }
                    Block::Note(text) => push_wrapped(&mut lines, text, Font::Italic, 9, 0, 4),
                }
            }
        }
        lines
    }
}

/// Greedy word wrap using an average Helvetica glyph width of half the font size.
fn push_wrapped(lines: &mut Vec<Line>, text: &str, font: Font, size: i64, indent: i64, gap: i64) {
    let text = sanitize(text);
    let usable = PAGE_WIDTH - 2 * MARGIN - indent;
    let max_chars = ((usable * 2) / size).max(10) as usize;

    let mut current = String::new();
    let mut first = true;
    let mut flush = |current: &mut String, lines: &mut Vec<Line>| {
        lines.push(Line {
            text: std::mem::take(current),
            font,
            size,
            indent,
            gap: if first { gap } else { 0 },
        });
        first = false;
    };

    for word in text.split_whitespace() {
        let mut word = word;
        // Words longer than a full line are hard-split.
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                flush(&mut current, lines);
            }
            let cut = word
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            current.push_str(&word[..cut]);
            flush(&mut current, lines);
            word = &word[cut..];
        }
        if word.is_empty() {
            continue;
        }
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            flush(&mut current, lines);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        flush(&mut current, lines);
    }
}

fn leading(size: i64) -> i64 {
    size * 14 / 10
}

/// Assign lines to pages. Returns per page the lines with their baseline y.
fn paginate(lines: Vec<Line>) -> Vec<Vec<(i64, Line)>> {
    let top = PAGE_HEIGHT - MARGIN;
    let bottom = MARGIN;
    let mut pages = vec![Vec::new()];
    let mut y = top;

    for line in lines {
        let mut step = leading(line.size);
        let on_fresh_page = pages.last().map(|p: &Vec<(i64, Line)>| p.is_empty()).unwrap_or(true);
        if !on_fresh_page {
            step += line.gap;
        }
        if y - step < bottom {
            pages.push(Vec::new());
            y = top;
            step = leading(line.size);
        }
        y -= step;
        if let Some(page) = pages.last_mut() {
            page.push((y, line));
        }
    }
    pages
}

fn text_op(font: &str, size: i64, x: i64, y: i64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(latin1_bytes(text))]),
        Operation::new("ET", vec![]),
    ]
}

impl LayoutRenderer for PdfLayout {
    fn name(&self) -> &str {
        "pdf"
    }

    fn render(&self, report: &ReportDocument) -> Result<Vec<u8>, ComposeError> {
        let layout_err = |e: lopdf::Error| ComposeError::Layout(e.to_string());

        let pages = paginate(self.lines(report));
        let total = pages.len();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font = |base: &str| {
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base,
                "Encoding" => "WinAnsiEncoding",
            }
        };
        let regular = doc.add_object(font("Helvetica"));
        let bold = doc.add_object(font("Helvetica-Bold"));
        let italic = doc.add_object(font("Helvetica-Oblique"));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
                "F3" => italic,
            },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(total);
        for (index, page) in pages.into_iter().enumerate() {
            let mut operations = Vec::new();
            for (y, line) in &page {
                operations.extend(text_op(
                    line.font.resource(),
                    line.size,
                    MARGIN + line.indent,
                    *y,
                    &line.text,
                ));
            }
            let footer = format!("{}  -  Page {} of {}", self.footer, index + 1, total);
            operations.extend(text_op("F3", 8, MARGIN, FOOTER_Y, &sanitize(&footer)));

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().map_err(layout_err)?,
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => total as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| ComposeError::Layout(e.to_string()))?;
        Ok(bytes)
    }
}
