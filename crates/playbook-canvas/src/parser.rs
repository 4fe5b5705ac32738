use regex::Regex;
use std::sync::LazyLock;

use playbook_core::CanvasSection;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading pattern is valid"));

/// Split markdown into sections at every heading line.
///
/// Text before the first heading becomes an `Introduction` section; a document
/// without headings becomes a single `Content` section. Ids are `s1`, `s2`, …
/// in document order.
pub fn parse_sections(markdown: &str) -> Vec<CanvasSection> {
    let mut raw: Vec<(String, u8, Vec<&str>)> = Vec::new();
    let mut preamble: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        if let Some(caps) = HEADING.captures(line) {
            let level = caps[1].len() as u8;
            let heading = caps[2].trim().to_string();
            raw.push((heading, level, Vec::new()));
        } else if let Some((_, _, body)) = raw.last_mut() {
            body.push(line);
        } else {
            preamble.push(line);
        }
    }

    let preamble = preamble.join("\n").trim().to_string();
    let mut sections = Vec::with_capacity(raw.len() + 1);

    if raw.is_empty() {
        sections.push(("Content".to_string(), 1, preamble));
    } else {
        if !preamble.is_empty() {
            sections.push(("Introduction".to_string(), 1, preamble));
        }
        for (heading, level, body) in raw {
            sections.push((heading, level, body.join("\n").trim().to_string()));
        }
    }

    sections
        .into_iter()
        .enumerate()
        .map(|(i, (heading, level, content))| {
            CanvasSection::new(format!("s{}", i + 1), heading, level, content)
        })
        .collect()
}

/// Render sections back to markdown: `"#"*level + " " + heading + "\n\n" + content`,
/// joined with a blank line.
pub fn render(sections: &[CanvasSection]) -> String {
    sections
        .iter()
        .map(|s| format!("{} {}\n\n{}", "#".repeat(s.level as usize), s.heading, s.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(sections: &[CanvasSection]) -> Vec<(&str, u8, &str)> {
        sections
            .iter()
            .map(|s| (s.heading.as_str(), s.level, s.content.as_str()))
            .collect()
    }

    #[test]
    fn splits_on_headings() {
        let sections = parse_sections("# A\nfoo\n## B\nbar");
        assert_eq!(shape(&sections), vec![("A", 1, "foo"), ("B", 2, "bar")]);
        assert_eq!(sections[0].id, "s1");
        assert_eq!(sections[1].id, "s2");
    }

    #[test]
    fn preamble_becomes_introduction() {
        let sections = parse_sections("hello there\n\n# Body\ntext");
        assert_eq!(
            shape(&sections),
            vec![("Introduction", 1, "hello there"), ("Body", 1, "text")]
        );
    }

    #[test]
    fn blank_preamble_is_dropped() {
        let sections = parse_sections("\n\n# Only\n");
        assert_eq!(shape(&sections), vec![("Only", 1, "")]);
    }

    #[test]
    fn no_headings_becomes_content() {
        let sections = parse_sections("just some text\nover lines\n");
        assert_eq!(
            shape(&sections),
            vec![("Content", 1, "just some text\nover lines")]
        );
    }

    #[test]
    fn seven_hashes_is_not_a_heading() {
        let sections = parse_sections("# A\n####### not a heading");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "####### not a heading");
    }

    #[test]
    fn hash_without_space_is_not_a_heading() {
        let sections = parse_sections("#tag\n# Real");
        assert_eq!(shape(&sections), vec![("Introduction", 1, "#tag"), ("Real", 1, "")]);
    }

    #[test]
    fn render_joins_with_blank_lines() {
        let sections = parse_sections("# A\nfoo\n## B\nbar");
        assert_eq!(render(&sections), "# A\n\nfoo\n\n## B\n\nbar");
    }

    #[test]
    fn rendered_form_reparses_identically() {
        let sections = parse_sections("intro\n# A\n\nfoo\n\n\n### C\n  bar  \n");
        let again = parse_sections(&render(&sections));
        assert_eq!(sections, again);
    }
}
