use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("unknown edit command `{command}` at offset {offset} in `{script}`")]
    UnknownCommand {
        script: String,
        command: char,
        offset: usize,
    },
    #[error("unterminated argument for edit command `{command}` in `{script}`")]
    Unterminated { script: String, command: char },
    #[error("edit command `{command}` needs a non-alphanumeric delimiter in `{script}`")]
    BadDelimiter { script: String, command: char },
    #[error("repeat count without a command at the end of `{script}`")]
    DanglingCount { script: String },
}

#[derive(Clone, Copy)]
enum Repeat {
    Times(usize),
    All,
}

impl Repeat {
    fn limit(self) -> usize {
        match self {
            Repeat::Times(n) => n,
            Repeat::All => usize::MAX,
        }
    }
}

struct Buffer {
    text: Vec<char>,
    cursor: usize,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Buffer {
    fn forward_word(&self) -> usize {
        let mut i = self.cursor;
        while i < self.text.len() && !is_word(self.text[i]) {
            i += 1;
        }
        while i < self.text.len() && is_word(self.text[i]) {
            i += 1;
        }
        i
    }

    fn backward_word(&self) -> usize {
        let mut i = self.cursor;
        while i > 0 && !is_word(self.text[i - 1]) {
            i -= 1;
        }
        while i > 0 && is_word(self.text[i - 1]) {
            i -= 1;
        }
        i
    }

    fn find_forward(&self, needle: &[char], from: usize) -> Option<usize> {
        if needle.is_empty() || needle.len() > self.text.len() {
            return None;
        }
        (from..=self.text.len() - needle.len()).find(|&i| self.text[i..i + needle.len()] == *needle)
    }

    fn find_backward(&self, needle: &[char]) -> Option<usize> {
        if needle.is_empty() || needle.len() > self.text.len() || self.cursor == 0 {
            return None;
        }
        let last = (self.cursor - 1).min(self.text.len() - needle.len());
        (0..=last)
            .rev()
            .find(|&i| self.text[i..i + needle.len()] == *needle)
    }
}

/// Apply an edit script to `text`.
///
/// The script is a sequence of commands, each optionally preceded by a decimal repeat
/// count or `*` (repeat while the command still changes something). Commands that cannot
/// act, such as a search with no further match, stop their own repetition and the script
/// continues with the next command.
pub fn edit_string(text: &str, script: &str) -> Result<String, EditError> {
    let mut buf = Buffer {
        text: text.chars().collect(),
        cursor: 0,
    };
    let cmds: Vec<char> = script.chars().collect();
    let mut i = 0usize;

    while i < cmds.len() {
        let mut repeat = None;
        if cmds[i] == '*' {
            repeat = Some(Repeat::All);
            i += 1;
        } else if cmds[i].is_ascii_digit() {
            let mut n = 0usize;
            while i < cmds.len() && cmds[i].is_ascii_digit() {
                n = n.saturating_mul(10).saturating_add(cmds[i] as usize - '0' as usize);
                i += 1;
            }
            repeat = Some(Repeat::Times(n));
        }
        let Some(&command) = cmds.get(i) else {
            return Err(EditError::DanglingCount {
                script: script.to_string(),
            });
        };
        let offset = i;
        i += 1;
        let times = repeat.unwrap_or(Repeat::Times(1)).limit();

        match command {
            'f' => {
                for _ in 0..times {
                    if buf.cursor >= buf.text.len() {
                        break;
                    }
                    buf.cursor += 1;
                }
            }
            'b' => {
                for _ in 0..times {
                    if buf.cursor == 0 {
                        break;
                    }
                    buf.cursor -= 1;
                }
            }
            'F' => {
                for _ in 0..times {
                    let next = buf.forward_word();
                    if next == buf.cursor {
                        break;
                    }
                    buf.cursor = next;
                }
            }
            'B' => {
                for _ in 0..times {
                    let next = buf.backward_word();
                    if next == buf.cursor {
                        break;
                    }
                    buf.cursor = next;
                }
            }
            'a' => buf.cursor = 0,
            'e' => buf.cursor = buf.text.len(),
            'd' => {
                for _ in 0..times {
                    if buf.cursor >= buf.text.len() {
                        break;
                    }
                    buf.text.remove(buf.cursor);
                }
            }
            'D' => {
                for _ in 0..times {
                    let end = buf.forward_word();
                    if end == buf.cursor {
                        break;
                    }
                    buf.text.drain(buf.cursor..end);
                }
            }
            'k' => buf.text.truncate(buf.cursor),
            'K' => {
                buf.text.drain(..buf.cursor);
                buf.cursor = 0;
            }
            'u' | 'l' => {
                let end = match repeat {
                    Some(Repeat::Times(n)) => buf.cursor.saturating_add(n).min(buf.text.len()),
                    _ => buf.text.len(),
                };
                let mut changed: Vec<char> = Vec::with_capacity(end - buf.cursor);
                for c in &buf.text[buf.cursor..end] {
                    if command == 'u' {
                        changed.extend(c.to_uppercase());
                    } else {
                        changed.extend(c.to_lowercase());
                    }
                }
                let len = changed.len();
                buf.text.splice(buf.cursor..end, changed);
                if matches!(repeat, Some(Repeat::Times(_))) {
                    buf.cursor += len;
                }
            }
            'i' | 's' | 'S' => {
                let (arg, next) = delimited(&cmds, i, 1, command, script)?;
                i = next;
                let arg = &arg[0];
                match command {
                    'i' => {
                        let n = if times == usize::MAX { 1 } else { times };
                        for _ in 0..n {
                            buf.text.splice(buf.cursor..buf.cursor, arg.iter().copied());
                            buf.cursor += arg.len();
                        }
                    }
                    's' => {
                        for _ in 0..times {
                            match buf.find_forward(arg, buf.cursor) {
                                Some(at) => buf.cursor = at + arg.len(),
                                None => break,
                            }
                        }
                    }
                    _ => {
                        for _ in 0..times {
                            match buf.find_backward(arg) {
                                Some(at) => buf.cursor = at,
                                None => break,
                            }
                        }
                    }
                }
            }
            '%' => {
                let (args, next) = delimited(&cmds, i, 2, command, script)?;
                i = next;
                let (old, new) = (&args[0], &args[1]);
                let mut from = buf.cursor;
                for _ in 0..times {
                    let Some(at) = buf.find_forward(old, from) else {
                        break;
                    };
                    buf.text.splice(at..at + old.len(), new.iter().copied());
                    from = at + new.len();
                }
            }
            other => {
                return Err(EditError::UnknownCommand {
                    script: script.to_string(),
                    command: other,
                    offset,
                })
            }
        }
    }
    Ok(buf.text.into_iter().collect())
}

/// Read `count` delimiter-separated arguments starting at the delimiter at `start`.
fn delimited(
    cmds: &[char],
    start: usize,
    count: usize,
    command: char,
    script: &str,
) -> Result<(Vec<Vec<char>>, usize), EditError> {
    let Some(&delim) = cmds.get(start) else {
        return Err(EditError::Unterminated {
            script: script.to_string(),
            command,
        });
    };
    if delim.is_alphanumeric() || delim.is_whitespace() {
        return Err(EditError::BadDelimiter {
            script: script.to_string(),
            command,
        });
    }
    let mut args = Vec::with_capacity(count);
    let mut i = start + 1;
    for _ in 0..count {
        let begin = i;
        while i < cmds.len() && cmds[i] != delim {
            i += 1;
        }
        if i >= cmds.len() {
            return Err(EditError::Unterminated {
                script: script.to_string(),
                command,
            });
        }
        args.push(cmds[begin..i].to_vec());
        i += 1;
    }
    Ok((args, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_and_move() {
        assert_eq!(edit_string("Name", "i/x/").expect("edit"), "xName");
        assert_eq!(edit_string("Name", "ei/Raw/").expect("edit"), "NameRaw");
        assert_eq!(edit_string("abc", "2fi/-/").expect("edit"), "ab-c");
        assert_eq!(edit_string("abc", "3i/./").expect("edit"), "...abc");
    }

    #[test]
    fn delete_and_kill() {
        assert_eq!(edit_string("abcdef", "2d").expect("edit"), "cdef");
        assert_eq!(edit_string("abcdef", "3fk").expect("edit"), "abc");
        assert_eq!(edit_string("abcdef", "3fK").expect("edit"), "def");
        assert_eq!(edit_string("one two", "D").expect("edit"), " two");
        assert_eq!(edit_string("one two three", "FD").expect("edit"), "one three");
    }

    #[test]
    fn search_and_replace() {
        assert_eq!(edit_string("a.b.c", "s/./k").expect("edit"), "a.");
        assert_eq!(edit_string("a.b.c", "eS/./k").expect("edit"), "a.b");
        assert_eq!(edit_string("xaxbx", "%/x/y/").expect("edit"), "yaxbx");
        assert_eq!(edit_string("xaxbx", "*%/x/yy/").expect("edit"), "yyayybyy");
        // No further match ends the repetition.
        assert_eq!(edit_string("abc", "5s/z/i/!/").expect("edit"), "!abc");
    }

    #[test]
    fn case_changes() {
        assert_eq!(edit_string("hello world", "u").expect("edit"), "HELLO WORLD");
        assert_eq!(edit_string("HELLO", "2l").expect("edit"), "heLLO");
        assert_eq!(edit_string("ab Cd", "Fl").expect("edit"), "ab cd");
    }

    #[test]
    fn malformed_scripts() {
        assert!(matches!(edit_string("x", "q"), Err(EditError::UnknownCommand { command: 'q', .. })));
        assert!(matches!(edit_string("x", "i/abc"), Err(EditError::Unterminated { .. })));
        assert!(matches!(edit_string("x", "iaxa"), Err(EditError::BadDelimiter { .. })));
        assert!(matches!(edit_string("x", "12"), Err(EditError::DanglingCount { .. })));
    }
}
