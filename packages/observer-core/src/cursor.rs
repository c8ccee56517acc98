//! Cursor position conversion (§4.G). The shim queries tmux for the
//! cursor's position within the pane's *visible* area and the pane's
//! height (`display-message -p "#{cursor_x}|#{cursor_y}|#{pane_height}"`,
//! streaming or one-shot); this module converts that into an absolute
//! line index against the captured buffer. Failure is absorbed to
//! `(0, 0)` by the caller — there is no better fallback than "unknown".

/// `(cursor_x, cursor_y_within_visible, pane_height)` plus the captured
/// buffer's line count → `(cursor_x, absolute_cursor_y)`, per §4.G's
/// formula: `max(0, |lines| - pane_height) + cursor_y_within_visible`.
pub fn to_absolute_line(cursor_x: u32, cursor_y: u32, pane_height: u32, line_count: usize) -> (u32, u32) {
    let scrollback = (line_count as u32).saturating_sub(pane_height);
    (cursor_x, scrollback + cursor_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_cursor_adds_scrollback_offset() {
        // 120 captured lines, pane is 24 rows tall, cursor sits on visible
        // row 5: absolute index is (120 - 24) + 5 = 101.
        let (x, y) = to_absolute_line(3, 5, 24, 120);
        assert_eq!(x, 3);
        assert_eq!(y, 101);
    }

    #[test]
    fn absolute_cursor_floors_at_zero_when_buffer_shorter_than_pane() {
        let (x, y) = to_absolute_line(0, 2, 24, 10);
        assert_eq!(x, 0);
        assert_eq!(y, 2);
    }
}
