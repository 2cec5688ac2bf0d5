use eframe::egui;

use crate::sync::SessionState;
use crate::ui::state::{AppState, DiagnosticKind};

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    ui.heading("Diagnostics");
    ui.separator();

    ui.horizontal(|ui| {
        ui.label("Session:");
        match &state.session {
            SessionState::Loading => {
                ui.spinner();
                ui.label("connecting...");
            }
            SessionState::Ready { user_id } => {
                ui.colored_label(egui::Color32::GREEN, "●");
                ui.label(user_id.as_str());
            }
            SessionState::Degraded { reason } => {
                ui.colored_label(egui::Color32::RED, "●");
                ui.label(format!("not connected ({reason})"));
            }
        }
    });

    ui.horizontal(|ui| {
        ui.label("Messages:");
        ui.label(format!("{}", state.messages.len()));
    });

    ui.horizontal(|ui| {
        ui.label("Sending:");
        ui.label(format!("{}", state.composer.in_flight()));
    });

    if let Some(reason) = &state.feed_error {
        ui.colored_label(
            egui::Color32::YELLOW,
            format!("Feed stale: {reason}"),
        );
    }

    ui.separator();

    ui.label("Recent Events:");
    egui::ScrollArea::vertical()
        .max_height(300.0)
        .show(ui, |ui| {
            for event in state.diagnostics.iter().rev().take(20) {
                let time_str = event
                    .timestamp
                    .with_timezone(&chrono::Local)
                    .format("%H:%M:%S");
                let color = match event.kind {
                    DiagnosticKind::Session => egui::Color32::LIGHT_BLUE,
                    DiagnosticKind::Sent => egui::Color32::GREEN,
                    DiagnosticKind::FeedError | DiagnosticKind::SendError => egui::Color32::RED,
                    DiagnosticKind::Feed => egui::Color32::WHITE,
                };

                ui.horizontal(|ui| {
                    ui.colored_label(color, format!("[{time_str}]"));
                    ui.label(event.message.as_str());
                });
            }
        });
}
