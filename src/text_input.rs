/// Editable text with a cursor counted in characters, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    text: String,
    cursor: usize,
}

impl TextInput {
    pub fn new(text: &str) -> Self {
        TextInput {
            text: text.to_string(),
            cursor: text.chars().count(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replaces the text and moves the cursor to its end.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.cursor = text.chars().count();
    }

    pub fn clear(&mut self) {
        self.set_text("");
    }

    fn byte_index(&self, cursor: usize) -> usize {
        self.text
            .char_indices()
            .nth(cursor)
            .map_or(self.text.len(), |(index, _)| index)
    }

    fn chars(&self) -> Vec<char> {
        self.text.chars().collect()
    }

    pub fn insert(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.text.insert(at, c);
        self.cursor += 1;
    }

    /// Returns whether anything was removed.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.text.remove(at);
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.text.chars().count() {
            return false;
        }
        let at = self.byte_index(self.cursor);
        self.text.remove(at);
        true
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = line_start(&self.chars(), self.cursor);
    }

    pub fn end(&mut self) {
        self.cursor = line_end(&self.chars(), self.cursor);
    }

    /// Same column on the previous line, or its end when shorter.
    pub fn up(&mut self) {
        let chars = self.chars();
        let start = line_start(&chars, self.cursor);
        if start == 0 {
            return;
        }
        let column = self.cursor - start;
        let previous_start = line_start(&chars, start - 1);
        let previous_len = start - 1 - previous_start;
        self.cursor = previous_start + column.min(previous_len);
    }

    pub fn down(&mut self) {
        let chars = self.chars();
        let end = line_end(&chars, self.cursor);
        if end == chars.len() {
            return;
        }
        let column = self.cursor - line_start(&chars, self.cursor);
        let next_start = end + 1;
        let next_len = line_end(&chars, next_start) - next_start;
        self.cursor = next_start + column.min(next_len);
    }

    /// Zero-based line and column of the cursor.
    pub fn line_col(&self) -> (usize, usize) {
        let chars = self.chars();
        let before = &chars[..self.cursor];
        let line = before.iter().filter(|c| **c == '\n').count();
        (line, self.cursor - line_start(&chars, self.cursor))
    }
}

fn line_start(chars: &[char], cursor: usize) -> usize {
    chars[..cursor]
        .iter()
        .rposition(|c| *c == '\n')
        .map_or(0, |i| i + 1)
}

fn line_end(chars: &[char], cursor: usize) -> usize {
    chars[cursor..]
        .iter()
        .position(|c| *c == '\n')
        .map_or(chars.len(), |i| cursor + i)
}
