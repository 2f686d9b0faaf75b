/// Split `text` into chunks of at most `max_chunk` bytes, preferring
/// paragraph boundaries, then sentence boundaries, with a hard character cut
/// only as a last resort. A sentence is never split mid-word when a sentence
/// boundary fits inside the budget.
pub fn split_text(text: &str, max_chunk: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in split_paragraphs(text) {
        let needed = if current.is_empty() {
            paragraph.len()
        } else {
            current.len() + 2 + paragraph.len()
        };
        if needed <= max_chunk {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&paragraph);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if paragraph.len() <= max_chunk {
            current = paragraph;
            continue;
        }

        // 整段超长，退到句子粒度
        for sentence in split_sentences(&paragraph) {
            let needed = if current.is_empty() {
                sentence.len()
            } else {
                current.len() + 1 + sentence.len()
            };
            if needed <= max_chunk {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(sentence);
            } else {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                if sentence.len() <= max_chunk {
                    current.push_str(sentence);
                } else {
                    // 最后手段：按字符硬切
                    hard_cut(sentence, max_chunk, &mut chunks, &mut current);
                }
            }
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Group lines into paragraphs separated by blank (or whitespace-only)
/// lines. Handles both `\n` and `\r\n` input.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

/// Split after `.`, `!` or `?` followed by whitespace. The terminator stays
/// with its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some(&(next_idx, next_ch)) = chars.peek() {
                if next_ch.is_whitespace() {
                    let sentence = text[start..next_idx].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_idx;
                }
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn hard_cut(sentence: &str, max_chunk: usize, chunks: &mut Vec<String>, current: &mut String) {
    let mut rest = sentence;
    while rest.len() > max_chunk {
        let mut cut = max_chunk;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // budget smaller than one character; take the character anyway
            cut = rest.chars().next().map(|c| c.len_utf8()).unwrap_or(rest.len());
        }
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    // the tail may still merge with whatever follows
    current.push_str(rest);
}
