//! Atom feed of the upcoming screenings.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::error::Error;
use std::io::Write;
use url::Url;

use crate::config::SiteConfig;
use crate::models::MovieRecord;
use crate::outputs::site::{ARCHIVE_FILE, FEED_FILE, screening_phrase};

fn rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn write_text_element<W: Write>(
    w: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), Box<dyn Error>> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_link<W: Write>(
    w: &mut Writer<W>,
    href: &str,
    rel: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let mut link = BytesStart::new("link");
    if let Some(rel) = rel {
        link.push_attribute(("rel", rel));
    }
    link.push_attribute(("href", href));
    w.write_event(Event::Empty(link))?;
    Ok(())
}

/// Render `upcoming` as an Atom document whose `<updated>` is `updated`.
///
/// Entries link to the movie's anchor in the archive page; an entry's own
/// `<updated>` is the record's `lastSourceDate`, falling back to the feed's.
pub fn render_feed(
    upcoming: &[&MovieRecord],
    site: &SiteConfig,
    updated: DateTime<Utc>,
) -> Result<String, Box<dyn Error>> {
    let base = Url::parse(&site.base_url)?;
    let archive = base.join(ARCHIVE_FILE)?;

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut feed_start = BytesStart::new("feed");
    feed_start.push_attribute(("xmlns", "http://www.w3.org/2005/Atom"));
    writer.write_event(Event::Start(feed_start))?;
    write_text_element(&mut writer, "title", &site.title)?;
    write_text_element(&mut writer, "id", base.as_str())?;
    write_link(&mut writer, base.as_str(), None)?;
    write_link(&mut writer, base.join(FEED_FILE)?.as_str(), Some("self"))?;
    write_text_element(&mut writer, "updated", &rfc3339(updated))?;
    writer.write_event(Event::Start(BytesStart::new("author")))?;
    write_text_element(&mut writer, "name", &site.title)?;
    writer.write_event(Event::End(BytesEnd::new("author")))?;

    for record in upcoming {
        let mut link = archive.clone();
        link.set_fragment(Some(&record.slug));

        writer.write_event(Event::Start(BytesStart::new("entry")))?;
        write_text_element(&mut writer, "title", &record.title)?;
        write_text_element(&mut writer, "id", link.as_str())?;
        write_link(&mut writer, link.as_str(), None)?;
        write_text_element(
            &mut writer,
            "updated",
            &rfc3339(record.last_source_date.unwrap_or(updated)),
        )?;
        write_text_element(&mut writer, "summary", &screening_phrase(record))?;
        writer.write_event(Event::End(BytesEnd::new("entry")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("feed")))?;
    let mut out = String::from_utf8(writer.into_inner())?;
    out.push('\n');
    Ok(out)
}
