//! Dockerfile テンプレート展開
//!
//! 構文:
//! - `$name` / `${name}`: パーシャル `name` の内容に置換（`name` は `[A-Za-z_][A-Za-z0-9_]*`）
//! - `$$`: 文字どおりの `$`
//!
//! 上記以外の `$` は `MalformedPlaceholder` になります。パーシャルの内容は
//! そのまま挿入され、再展開はしません。

use crate::error::{ForgeError, Result};
use crate::partials::Partials;
use std::path::Path;

const SIGIL: u8 = b'$';

/// 展開済みテンプレートの構成要素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Sigil,
    Placeholder(&'a str),
}

/// パーシャル集合を使ってテンプレートを展開する
pub struct Renderer<'a> {
    partials: &'a Partials,
}

impl<'a> Renderer<'a> {
    pub fn new(partials: &'a Partials) -> Self {
        Self { partials }
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&self, template: &str) -> Result<String> {
        render(template, self.partials)
    }

    /// ファイルを読み込んで展開
    pub fn render_file(&self, path: &Path) -> Result<String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ForgeError::file_access(path, e))?;

        self.render_str(&content).map_err(|e| ForgeError::Template {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }
}

/// テンプレートを展開
///
/// 未定義のパーシャルを参照している場合、読み順で最初のものを
/// `MissingPartial` として返す。
pub fn render(template: &str, partials: &Partials) -> Result<String> {
    let segments = parse(template)?;

    let mut output = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => output.push_str(text),
            Segment::Sigil => output.push('$'),
            Segment::Placeholder(name) => {
                let body = partials
                    .get(name)
                    .ok_or_else(|| ForgeError::MissingPartial(name.to_string()))?;
                output.push_str(body);
            }
        }
    }

    Ok(output)
}

/// テンプレートが参照するパーシャル名（重複なし、出現順）
pub fn placeholders(template: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Placeholder(name) = segment
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// パーシャル集合に存在しない参照名の一覧
pub fn missing_partials(template: &str, partials: &Partials) -> Result<Vec<String>> {
    Ok(placeholders(template)?
        .into_iter()
        .filter(|name| !partials.contains(name))
        .collect())
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(offset) = template[pos..].find(SIGIL as char) {
        let sigil = pos + offset;
        if sigil > literal_start {
            segments.push(Segment::Text(&template[literal_start..sigil]));
        }

        let rest = &template[sigil + 1..];
        match rest.as_bytes().first() {
            Some(&SIGIL) => {
                segments.push(Segment::Sigil);
                pos = sigil + 2;
            }
            Some(b'{') => {
                let inner = &rest[1..];
                let len = identifier_len(inner);
                if len == 0 || inner.as_bytes().get(len) != Some(&b'}') {
                    return Err(malformed(template, sigil));
                }
                segments.push(Segment::Placeholder(&inner[..len]));
                // "${" + name + "}"
                pos = sigil + 2 + len + 1;
            }
            Some(_) => {
                let len = identifier_len(rest);
                if len == 0 {
                    return Err(malformed(template, sigil));
                }
                segments.push(Segment::Placeholder(&rest[..len]));
                pos = sigil + 1 + len;
            }
            None => return Err(malformed(template, sigil)),
        }

        literal_start = pos;
    }

    if literal_start < template.len() {
        segments.push(Segment::Text(&template[literal_start..]));
    }

    Ok(segments)
}

/// 先頭から識別子として読める長さ（バイト数、ASCII のみ）
fn identifier_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return 0,
    }
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count()
}

fn malformed(template: &str, offset: usize) -> ForgeError {
    let before = &template[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    ForgeError::MalformedPlaceholder { line, column }
}
