use chrono::{DateTime, Local, Utc};
use eframe::egui;

use crate::common::ChatMessage;

pub const EMPTY_THREAD_TEXT: &str = "No messages yet. Start the conversation!";

/// One message as it should appear in the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub id: String,
    pub text: String,
    /// Written by the session user: right-aligned and highlighted.
    pub own: bool,
    /// Only set for other people's messages.
    pub author_label: Option<String>,
    pub time: String,
}

pub fn layout(messages: &[ChatMessage], user_id: Option<&str>) -> Vec<Bubble> {
    messages
        .iter()
        .map(|message| {
            let own = user_id == Some(message.author_id.as_str());
            Bubble {
                id: message.id.clone(),
                text: message.text.clone(),
                own,
                author_label: (!own).then(|| message.author_id.clone()),
                time: format_time(message.created_at),
            }
        })
        .collect()
}

/// Local time of day, e.g. `14:05`.
pub fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

pub fn render(ui: &mut egui::Ui, bubbles: &[Bubble], scroll_to_latest: bool, max_height: f32) {
    egui::ScrollArea::vertical()
        .max_height(max_height)
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            if bubbles.is_empty() {
                ui.vertical_centered(|ui| {
                    ui.add_space(24.0);
                    ui.label(egui::RichText::new(EMPTY_THREAD_TEXT).weak());
                });
                return;
            }

            for bubble in bubbles {
                render_bubble(ui, bubble);
                ui.add_space(4.0);
            }

            if scroll_to_latest {
                ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
            }
        });
}

fn render_bubble(ui: &mut egui::Ui, bubble: &Bubble) {
    let (layout, fill) = if bubble.own {
        (
            egui::Layout::right_to_left(egui::Align::TOP),
            ui.visuals().selection.bg_fill,
        )
    } else {
        (
            egui::Layout::left_to_right(egui::Align::TOP),
            ui.visuals().faint_bg_color,
        )
    };
    let max_width = ui.available_width() * 0.75;

    ui.with_layout(layout, |ui| {
        egui::Frame::new()
            .fill(fill)
            .corner_radius(egui::CornerRadius::same(8))
            .inner_margin(egui::Margin::same(8))
            .show(ui, |ui| {
                ui.set_max_width(max_width);
                ui.vertical(|ui| {
                    if let Some(author) = &bubble.author_label {
                        ui.label(egui::RichText::new(author).small().weak());
                    }
                    ui.label(bubble.text.as_str());
                    ui.label(egui::RichText::new(&bubble.time).small().weak());
                });
            });
    });
}
