use eframe::egui;

/// Draws the composer. Returns true when the user asked to send.
///
/// The buffer is not cleared here; that happens once the store confirms.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, enabled: bool) -> bool {
    let mut send = false;
    ui.add_enabled_ui(enabled, |ui| {
        ui.horizontal(|ui| {
            let hint = if enabled {
                "Type a message..."
            } else {
                "Not connected"
            };
            let response = ui.add(
                egui::TextEdit::singleline(input_text)
                    .hint_text(hint)
                    .desired_width(ui.available_width() - 60.0),
            );

            let can_send = !input_text.trim().is_empty();
            if ui
                .add_enabled(can_send, egui::Button::new("Send"))
                .clicked()
            {
                send = true;
            }

            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send = can_send;
                response.request_focus();
            }
        });
    });

    send
}
