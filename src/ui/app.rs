use eframe::egui;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::common::{BackendCommand, BackendEvent};
use crate::sync::SessionState;

use super::components::{chat_area, debug_panel, input_bar};
use super::state::AppState;

const COMPOSER_HEIGHT: f32 = 64.0;

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<BackendCommand>,
    event_receiver: mpsc::Receiver<BackendEvent>,
    sync_stopped: bool,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<BackendCommand>,
        event_receiver: mpsc::Receiver<BackendEvent>,
    ) -> Self {
        Self {
            state: AppState::new(),
            command_sender,
            event_receiver,
            sync_stopped: false,
        }
    }

    fn handle_backend_events(&mut self) {
        loop {
            match self.event_receiver.try_recv() {
                Ok(event) => self.state.apply(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.sync_stopped {
                        log::warn!("Sync client stopped; no further updates");
                        self.sync_stopped = true;
                        self.state.sync_stopped();
                    }
                    break;
                }
            }
        }
    }

    fn submit(&mut self) {
        let command = match self.state.begin_submit() {
            Ok(command) => command,
            Err(err) => {
                log::debug!("Not sending: {err}");
                return;
            }
        };

        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to sync client: {err}");
            let BackendCommand::Submit { submission, .. } = err.into_inner();
            self.state
                .abandon_submit(submission, "sync client unavailable".to_string());
        }
    }

    fn render_status(&self, ui: &mut egui::Ui) {
        match &self.state.session {
            SessionState::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Connecting...");
                });
            }
            SessionState::Ready { user_id } => {
                ui.label(egui::RichText::new(format!("Signed in as {user_id}")).weak());
            }
            SessionState::Degraded { reason } => {
                ui.colored_label(
                    egui::Color32::RED,
                    format!("Not connected: {reason}"),
                );
            }
        }

        if self.state.feed_error.is_some() {
            ui.colored_label(
                egui::Color32::YELLOW,
                "Live updates interrupted; showing last known messages",
            );
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_backend_events();

        egui::SidePanel::right("debug_panel")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                debug_panel::render(ui, &self.state);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Live Chat");
            self.render_status(ui);
            ui.separator();

            if self.state.session.is_loading() {
                ui.centered_and_justified(|ui| {
                    ui.spinner();
                });
                return;
            }

            let bubbles = self.state.bubbles();
            let scroll = self.state.take_scroll_request();
            let thread_height = (ui.available_height() - COMPOSER_HEIGHT).max(0.0);
            chat_area::render(ui, &bubbles, scroll, thread_height);

            ui.separator();
            let enabled = self.state.session.is_ready();
            if input_bar::render(ui, &mut self.state.composer.input, enabled) {
                self.submit();
            }
            if let Some(reason) = &self.state.send_error {
                ui.colored_label(egui::Color32::RED, format!("Send failed: {reason}"));
            }
        });

        // Events arrive from another task; keep polling the channel.
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
