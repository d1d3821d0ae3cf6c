
// From https://github.com/raphlinus/pulldown-cmark
// A modified version of the HTML writer that currently:
// - emits emoji images for shortcodes and emoticons in text
// - gives headings `heading--<slug>` ids
// - resolves `upload://` image sources
// - turns paragraphs holding a single bare link into onebox placeholders

/*
The MIT License

Copyright 2015 Google Inc. All rights reserved.

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in
all copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
THE SOFTWARE.
*/

use std::collections::HashMap;

use pulldown_cmark_escape::{escape_href, escape_html, escape_html_body_text, StrWrite};
use pulldown_cmark::{CowStr, Event};
use pulldown_cmark::{Alignment, CodeBlockKind, LinkType, Tag, TagEnd};

use emoji::{EmojiEngine, EmojiOptions};

use crate::cache::{ShortUrl, ShortUrlCache};

pub const UPLOAD_SCHEME: &str = "upload://";

/// Image source for uploads the short-url cache couldn't resolve.
pub const MISSING_UPLOAD_SRC: &str = "/images/transparent.png";

/// Writes into a `String` can't fail.
fn into_string(result: std::fmt::Result) {
    result.expect("writing to a String cannot fail")
}

enum TableState {
    Head,
    Body,
}

/// The url of a paragraph made of nothing but one http(s) link, either as
/// plain text, an autolink, or an inline link whose text is its url.
fn bare_link<'a>(events: &[Event<'a>]) -> Option<CowStr<'a>> {
    let url = match events {
        [Event::Text(text)] => text.clone(),
        [Event::Start(Tag::Link { link_type: LinkType::Autolink, dest_url, .. }), Event::Text(_), Event::End(TagEnd::Link)] => {
            dest_url.clone()
        }
        [Event::Start(Tag::Link { link_type: LinkType::Inline, dest_url, title, .. }), Event::Text(text), Event::End(TagEnd::Link)]
            if **text == **dest_url && title.is_empty() =>
        {
            dest_url.clone()
        }
        _ => return None,
    };
    if url.contains(char::is_whitespace) {
        return None;
    }
    match url::Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() => Some(url),
        _ => None,
    }
}

fn onebox_anchor(url: &str) -> String {
    let mut out = String::with_capacity(url.len() * 2 + 48);
    out.push_str("<a class=\"onebox\" href=\"");
    into_string(escape_href(&mut out, url));
    out.push_str("\" target=\"_blank\">");
    into_string(escape_html(&mut out, url));
    out.push_str("</a>");
    out
}

/// Replace the content of top-level paragraphs that hold a single bare link
/// with a `a.onebox` placeholder. Expects merged text events.
pub fn onebox_links<'a>(iter: impl Iterator<Item = Event<'a>> + 'a) -> impl Iterator<Item = Event<'a>> + 'a {
    use next_gen::generator_fn::CallBoxed;
    #[next_gen::generator(yield(Event<'a>))]
    fn onebox_links_inner<'a>(mut iter: impl Iterator<Item = Event<'a>>) {
        let mut depth = 0usize;
        while let Some(elem) = iter.next() {
            match elem {
                Event::Start(Tag::Paragraph) if depth == 0 => {
                    let mut inner = Vec::new();
                    while let Some(elem) = iter.next() {
                        if matches!(elem, Event::End(TagEnd::Paragraph)) {
                            break;
                        }
                        inner.push(elem);
                    }
                    yield_!(Event::Start(Tag::Paragraph));
                    if let Some(url) = bare_link(&inner) {
                        yield_!(Event::InlineHtml(onebox_anchor(&url).into()));
                    } else {
                        for elem in inner {
                            yield_!(elem);
                        }
                    }
                    yield_!(Event::End(TagEnd::Paragraph));
                }
                Event::Start(_) => {
                    depth += 1;
                    yield_!(elem);
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    yield_!(elem);
                }
                _ => yield_!(elem),
            }
        }
    }
    onebox_links_inner.call_boxed((iter,))
}

/// Every `upload://` image source, in document order.
pub fn upload_references<'e>(events: &'e [Event<'_>]) -> Vec<&'e str> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Start(Tag::Image { dest_url, .. }) if dest_url.starts_with(UPLOAD_SCHEME) => Some(&**dest_url),
            _ => None,
        })
        .collect()
}

/// Lowercase ascii words joined by `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

#[derive(Clone, Copy, Default)]
pub struct Options<'c> {
    pub soft_breaks_as_hard: bool,
    pub heading_ids: bool,
    pub emoji: Option<(&'c EmojiEngine, &'c EmojiOptions)>,
    pub uploads: Option<&'c ShortUrlCache>,
}

#[derive(Default)]
struct HeadingBuffer<'a> {
    text_buffer: String,
    active: bool,
    classes: Vec<CowStr<'a>>,
    attrs: Vec<(CowStr<'a>, Option<CowStr<'a>>)>,
}

struct InterceptWriter<W> {
    inner: W,
    intercept: Vec<String>,
}

#[derive(Debug)]
enum InterceptError<E> {
    Inner(E),
    Fmt(std::fmt::Error),
}

impl<W> StrWrite for InterceptWriter<W> where W: StrWrite {
    type Error = InterceptError<W::Error>;
    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        if let Some(buf) = self.intercept.last_mut() {
            buf.push_str(s);
            Ok(())
        } else {
            self.inner.write_str(s).map_err(InterceptError::Inner)
        }
    }
    fn write_fmt(&mut self, args: std::fmt::Arguments) -> Result<(), Self::Error> {
        if let Some(buf) = self.intercept.last_mut() {
            std::fmt::Write::write_fmt(buf, args).map_err(InterceptError::Fmt)
        } else {
            self.inner.write_fmt(args).map_err(InterceptError::Inner)
        }
    }
}

struct HtmlWriter<'a, 'c, I, W> {
    /// Iterator supplying events.
    iter: I,

    /// Writer to write to.
    writer: InterceptWriter<W>,

    /// Whether or not the last write wrote a newline.
    end_newline: bool,

    /// Whether if inside a metadata block (text should not be written)
    in_non_writing_block: bool,

    /// Text is written verbatim in code blocks and autolinks
    in_code_block: bool,
    in_literal_link: bool,

    heading_buffer: HeadingBuffer<'a>,
    heading_ids: HashMap<String, usize>,

    options: Options<'c>,

    table_state: TableState,
    table_alignments: Vec<Alignment>,
    table_cell_index: usize,
    numbers: HashMap<CowStr<'a>, usize>,
}

impl<'a, 'c, I, W> HtmlWriter<'a, 'c, I, W>
where
    I: Iterator<Item = Event<'a>>,
    W: StrWrite,
{
    fn new(iter: I, writer: W, options: Options<'c>) -> Self {
        Self {
            iter,
            writer: InterceptWriter { inner: writer, intercept: Vec::new() },
            options,
            end_newline: true,
            in_non_writing_block: false,
            in_code_block: false,
            in_literal_link: false,
            heading_buffer: Default::default(),
            heading_ids: HashMap::new(),
            table_state: TableState::Head,
            table_alignments: vec![],
            table_cell_index: 0,
            numbers: HashMap::new(),
        }
    }

    /// Writes a new line.
    fn write_newline(&mut self) -> Result<(), InterceptError<W::Error>> {
        self.end_newline = true;
        self.writer.write_str("\n")?;
        Ok(())
    }

    /// Writes a buffer, and tracks whether or not a newline was written.
    #[inline]
    fn write(&mut self, s: &str) -> Result<(), InterceptError<W::Error>> {
        self.writer.write_str(s)?;

        if !s.is_empty() {
            self.end_newline = s.ends_with('\n');
        }
        Ok(())
    }

    /// Body text, with emoji substituted where allowed.
    fn write_text(&mut self, text: &str) -> Result<(), InterceptError<W::Error>> {
        match self.options.emoji {
            Some((engine, options)) if !self.in_code_block && !self.in_literal_link => {
                let mut html = String::with_capacity(text.len());
                engine.unescape_into(&mut html, text, options, |out, literal| {
                    into_string(escape_html_body_text(out, literal))
                });
                self.writer.write_str(&html)
            }
            _ => escape_html_body_text(&mut self.writer, text),
        }
    }

    fn heading_id(&mut self, text: &str) -> String {
        let mut slug = slugify(text);
        if slug.is_empty() {
            slug.push('h');
        }
        let seen = self.heading_ids.entry(slug.clone()).or_insert(0);
        *seen += 1;
        match *seen {
            1 => format!("heading--{slug}"),
            n => format!("heading--{slug}-{}", n - 1),
        }
    }

    fn run(mut self) -> Result<(), InterceptError<W::Error>> {
        while let Some(event) = self.iter.next() {
            match event {
                Event::Start(tag) => {
                    self.start_tag(tag)?;
                }
                Event::End(tag) => {
                    self.end_tag(tag)?;
                }
                Event::Text(text) => {
                    if self.heading_buffer.active {
                        self.heading_buffer.text_buffer.push_str(&text);
                    }
                    if !self.in_non_writing_block {
                        self.write_text(&text)?;
                        self.end_newline = text.ends_with('\n');
                    }
                }
                Event::Code(text) => {
                    self.write("<code>")?;
                    if self.heading_buffer.active {
                        self.heading_buffer.text_buffer.push_str(&text);
                    }
                    escape_html_body_text(&mut self.writer, &text)?;
                    self.write("</code>")?;
                }
                ref event @ (Event::InlineMath(ref text) | Event::DisplayMath(ref text)) => {
                    let mode = if matches!(event, Event::InlineMath(..)) { "$" } else { "$$" };
                    self.write("<code>")?;
                    self.write(mode)?;
                    if self.heading_buffer.active {
                        self.heading_buffer.text_buffer.push_str(text);
                    }
                    escape_html_body_text(&mut self.writer, text)?;
                    self.write(mode)?;
                    self.write("</code>")?;
                }
                Event::Html(html) | Event::InlineHtml(html) => {
                    self.write(&html)?;
                }
                Event::SoftBreak => {
                    if self.heading_buffer.active {
                        self.heading_buffer.text_buffer.push('\n');
                    }
                    if self.options.soft_breaks_as_hard {
                        self.write("<br />\n")?;
                    } else {
                        self.write_newline()?;
                    }
                }
                Event::HardBreak => {
                    if self.heading_buffer.active {
                        self.heading_buffer.text_buffer.push('\n');
                    }
                    self.write("<br />\n")?;
                }
                Event::Rule => {
                    if self.end_newline {
                        self.write("<hr />\n")?;
                    } else {
                        self.write("\n<hr />\n")?;
                    }
                }
                Event::FootnoteReference(name) => {
                    let len = self.numbers.len() + 1;
                    self.write("<sup class=\"footnote-reference\"><a href=\"#")?;
                    escape_html(&mut self.writer, &name)?;
                    self.write("\">")?;
                    let number = *self.numbers.entry(name).or_insert(len);
                    write!(&mut self.writer, "{}", number)?;
                    self.write("</a></sup>")?;
                }
                Event::TaskListMarker(true) => {
                    self.write("<span class=\"task-list-mark\">[x]</span> ")?;
                }
                Event::TaskListMarker(false) => {
                    self.write("<span class=\"task-list-mark\">[ ]</span> ")?;
                }
            }
        }
        Ok(())
    }

    fn write_heading_start(
        &mut self,
        level: pulldown_cmark::HeadingLevel,
        id: Option<&str>,
        classes: Vec<CowStr<'a>>,
        attrs: Vec<(CowStr<'a>, Option<CowStr<'a>>)>
    ) -> Result<(), InterceptError<W::Error>> {
        self.write("<")?;
        write!(&mut self.writer, "{}", level)?;

        if let Some(id) = id {
            self.write(" id=\"")?;
            escape_html(&mut self.writer, id)?;
            self.write("\"")?;
        }
        let mut classes = classes.iter();
        if let Some(class) = classes.next() {
            self.write(" class=\"")?;
            escape_html(&mut self.writer, class)?;
            for class in classes {
                self.write(" ")?;
                escape_html(&mut self.writer, class)?;
            }
            self.write("\"")?;
        }
        for (attr, value) in attrs {
            self.write(" ")?;
            escape_html(&mut self.writer, &attr)?;
            if let Some(val) = value {
                self.write("=\"")?;
                escape_html(&mut self.writer, &val)?;
                self.write("\"")?;
            } else {
                self.write("=\"\"")?;
            }
        }
        self.write(">")
    }

    /// Writes the start of an HTML tag.
    fn start_tag(&mut self, tag: Tag<'a>) -> Result<(), InterceptError<W::Error>> {
        match tag {
            Tag::HtmlBlock => Ok(()),
            Tag::Paragraph => {
                if self.end_newline {
                    self.write("<p>")
                } else {
                    self.write("\n<p>")
                }
            }
            Tag::Heading {
                level,
                id,
                classes,
                attrs,
            } => {
                if self.end_newline {
                    self.end_newline = false;
                } else {
                    self.write("\n")?;
                }

                match (self.options.heading_ids, id) {
                    (true, None) => {
                        // The id depends on the heading text, buffer until the end
                        self.writer.intercept.push(String::with_capacity(64));
                        self.heading_buffer.active = true;
                        self.heading_buffer.classes = classes;
                        self.heading_buffer.attrs = attrs;
                        Ok(())
                    }
                    (true, Some(id)) => {
                        let id = self.heading_id(&id);
                        self.write_heading_start(level, Some(&id), classes, attrs)
                    }
                    (false, id) => self.write_heading_start(level, id.as_deref(), classes, attrs),
                }
            }
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                self.write("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                self.write("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                self.write("<tr>")
            }
            Tag::TableCell => {
                match self.table_state {
                    TableState::Head => {
                        self.write("<th")?;
                    }
                    TableState::Body => {
                        self.write("<td")?;
                    }
                }
                match self.table_alignments.get(self.table_cell_index) {
                    Some(&Alignment::Left) => self.write(" style=\"text-align: left\">"),
                    Some(&Alignment::Center) => self.write(" style=\"text-align: center\">"),
                    Some(&Alignment::Right) => self.write(" style=\"text-align: right\">"),
                    _ => self.write(">"),
                }
            }
            Tag::BlockQuote(_) => {
                if !self.end_newline {
                    self.write("\n")?;
                }
                self.write("<blockquote>\n")
            }
            Tag::CodeBlock(info) => {
                if !self.end_newline {
                    self.write_newline()?;
                }
                self.in_code_block = true;
                let lang = match &info {
                    CodeBlockKind::Fenced(info) => info.split_whitespace().next(),
                    CodeBlockKind::Indented => None,
                };
                match lang {
                    Some(lang) => {
                        self.write("<pre><code class=\"lang-")?;
                        escape_html(&mut self.writer, lang)?;
                        self.write("\">")
                    }
                    None => self.write("<pre><code>"),
                }
            }
            Tag::List(Some(1)) => {
                if self.end_newline {
                    self.write("<ol>\n")
                } else {
                    self.write("\n<ol>\n")
                }
            }
            Tag::List(Some(start)) => {
                if self.end_newline {
                    self.write("<ol start=\"")?;
                } else {
                    self.write("\n<ol start=\"")?;
                }
                write!(&mut self.writer, "{}", start)?;
                self.write("\">\n")
            }
            Tag::List(None) => {
                if self.end_newline {
                    self.write("<ul>\n")
                } else {
                    self.write("\n<ul>\n")
                }
            }
            Tag::Item => {
                if self.end_newline {
                    self.write("<li>")
                } else {
                    self.write("\n<li>")
                }
            }
            Tag::Emphasis => self.write("<em>"),
            Tag::Strong => self.write("<strong>"),
            Tag::Strikethrough => self.write("<del>"),
            Tag::Link {
                link_type: LinkType::Email,
                dest_url,
                title,
                id: _,
            } => {
                self.in_literal_link = true;
                self.write("<a href=\"mailto:")?;
                escape_href(&mut self.writer, &dest_url)?;
                if !title.is_empty() {
                    self.write("\" title=\"")?;
                    escape_html(&mut self.writer, &title)?;
                }
                self.write("\">")
            }
            Tag::Link {
                link_type,
                dest_url,
                title,
                id: _,
            } => {
                self.in_literal_link = matches!(link_type, LinkType::Autolink);
                self.write("<a href=\"")?;
                escape_href(&mut self.writer, &dest_url)?;
                if !title.is_empty() {
                    self.write("\" title=\"")?;
                    escape_html(&mut self.writer, &title)?;
                }
                self.write("\">")
            }
            Tag::Image {
                link_type: _,
                dest_url,
                title,
                id: _,
            } => {
                self.write("<img src=\"")?;
                match self.upload_src(&dest_url) {
                    Some(src) => {
                        escape_href(&mut self.writer, &src)?;
                        self.write("\" data-orig-src=\"")?;
                        escape_href(&mut self.writer, &dest_url)?;
                    }
                    None => escape_href(&mut self.writer, &dest_url)?,
                }
                self.write("\" alt=\"")?;
                self.raw_text()?;
                if !title.is_empty() {
                    self.write("\" title=\"")?;
                    escape_html(&mut self.writer, &title)?;
                }
                self.write("\" />")
            }
            Tag::FootnoteDefinition(name) => {
                if self.end_newline {
                    self.write("<div class=\"footnote-definition\" id=\"")?;
                } else {
                    self.write("\n<div class=\"footnote-definition\" id=\"")?;
                }
                escape_html(&mut self.writer, &name)?;
                self.write("\"><sup class=\"footnote-definition-label\">")?;
                let len = self.numbers.len() + 1;
                let number = *self.numbers.entry(name).or_insert(len);
                write!(&mut self.writer, "{}", number)?;
                self.write("</sup>")
            }
            Tag::MetadataBlock(_) => {
                self.in_non_writing_block = true;
                Ok(())
            }
        }
    }

    fn end_tag(&mut self, tag: TagEnd) -> Result<(), InterceptError<W::Error>> {
        match tag {
            TagEnd::HtmlBlock => {}
            TagEnd::Paragraph => {
                self.write("</p>\n")?;
            }
            TagEnd::Heading(level) => {
                if self.heading_buffer.active {
                    self.heading_buffer.active = false;

                    let content = self.writer.intercept.pop().unwrap_or_default();
                    let text = std::mem::take(&mut self.heading_buffer.text_buffer);
                    let id = self.heading_id(&text);

                    let classes = std::mem::take(&mut self.heading_buffer.classes);
                    let attrs = std::mem::take(&mut self.heading_buffer.attrs);
                    self.write_heading_start(level, Some(&id), classes, attrs)?;

                    self.write(&content)?;
                }

                self.write("</")?;
                write!(&mut self.writer, "{}", level)?;
                self.write(">\n")?;
            }
            TagEnd::Table => {
                self.write("</tbody></table>\n")?;
            }
            TagEnd::TableHead => {
                self.write("</tr></thead><tbody>\n")?;
                self.table_state = TableState::Body;
            }
            TagEnd::TableRow => {
                self.write("</tr>\n")?;
            }
            TagEnd::TableCell => {
                match self.table_state {
                    TableState::Head => {
                        self.write("</th>")?;
                    }
                    TableState::Body => {
                        self.write("</td>")?;
                    }
                }
                self.table_cell_index += 1;
            }
            TagEnd::BlockQuote => {
                self.write("</blockquote>\n")?;
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.write("</code></pre>\n")?;
            }
            TagEnd::List(true) => {
                self.write("</ol>\n")?;
            }
            TagEnd::List(false) => {
                self.write("</ul>\n")?;
            }
            TagEnd::Item => {
                self.write("</li>\n")?;
            }
            TagEnd::Emphasis => {
                self.write("</em>")?;
            }
            TagEnd::Strong => {
                self.write("</strong>")?;
            }
            TagEnd::Strikethrough => {
                self.write("</del>")?;
            }
            TagEnd::Link => {
                self.in_literal_link = false;
                self.write("</a>")?;
            }
            TagEnd::Image => (), // shouldn't happen, handled in start
            TagEnd::FootnoteDefinition => {
                self.write("</div>\n")?;
            }
            TagEnd::MetadataBlock(_) => {
                self.in_non_writing_block = false;
            }
        }
        Ok(())
    }

    // run raw text, consuming end tag
    fn raw_text(&mut self) -> Result<(), InterceptError<W::Error>> {
        let mut nest = 0;
        while let Some(event) = self.iter.next() {
            match event {
                Event::Start(_) => nest += 1,
                Event::End(_) => {
                    if nest == 0 {
                        break;
                    }
                    nest -= 1;
                }
                Event::Html(_) => {}
                Event::InlineHtml(text) | Event::Code(text) | Event::Text(text) => {
                    // Don't use escape_html_body_text here.
                    // The output of this function is used in the `alt` attribute.
                    escape_html(&mut self.writer, &text)?;
                    self.end_newline = text.ends_with('\n');
                }
                Event::InlineMath(text) => {
                    self.write("$")?;
                    escape_html(&mut self.writer, &text)?;
                    self.write("$")?;
                    self.end_newline = false;
                }
                Event::DisplayMath(text) => {
                    self.write("$$")?;
                    escape_html(&mut self.writer, &text)?;
                    self.write("$$")?;
                    self.end_newline = false;
                }
                Event::SoftBreak | Event::HardBreak | Event::Rule => {
                    self.write(" ")?;
                }
                Event::FootnoteReference(name) => {
                    let len = self.numbers.len() + 1;
                    let number = *self.numbers.entry(name).or_insert(len);
                    write!(&mut self.writer, "[{}]", number)?;
                }
                Event::TaskListMarker(true) => self.write("[x]")?,
                Event::TaskListMarker(false) => self.write("[ ]")?,
            }
        }
        Ok(())
    }

    /// The `src` to emit for an `upload://` reference, `None` for other urls.
    fn upload_src(&self, dest_url: &str) -> Option<String> {
        if !dest_url.starts_with(UPLOAD_SCHEME) {
            return None;
        }
        match self.options.uploads.and_then(|cache| cache.lookup(dest_url)) {
            Some(ShortUrl::Resolved { url, .. }) => Some(url),
            Some(ShortUrl::Missing) | None => {
                trace!(dest_url, "unresolved upload");
                Some(MISSING_UPLOAD_SRC.to_string())
            }
        }
    }
}

pub fn push_html<'a, I>(s: &mut String, iter: I, options: Options<'_>) -> Result<(), std::fmt::Error>
where
    I: Iterator<Item = Event<'a>>,
{
    HtmlWriter::new(iter, s, options).run().map_err(|err| match err {
        InterceptError::Inner(_) => std::fmt::Error,
        InterceptError::Fmt(err) => err,
    })
}
