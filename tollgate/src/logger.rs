use logforth::{
    append::Stdout,
    layout::{JsonLayout, TextLayout},
};

use crate::args::{LogLevel, LogStyle};

pub(super) fn init(level: LogLevel, style: LogStyle) {
    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(level.env_filter());

            if style.is_json() {
                d.append(Stdout::default().with_layout(JsonLayout::default()))
            } else if style.use_color() {
                d.append(Stdout::default().with_layout(TextLayout::default()))
            } else {
                d.append(Stdout::default().with_layout(TextLayout::default().no_color()))
            }
        })
        .apply();
}
