use crate::config::Config;
use crate::core::audio::AudioHandle;
use crate::core::gfx::{Quad, QuadRenderer};
use crate::game::chart::{ChartData, ChartNote};
use crate::game::conductor::Conductor;
use crate::game::note::Note;
use crate::game::scroll::{ScrollSpeedCalculator, ScrollSpeedSetting};
use glam::Vec2;
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;

const STRUM_PRESSED_OPACITY: f32 = 0.8;
// Where freshly built notes wait before their first update.
const SPAWN_Y: f32 = -100.0;

const LANE_BACKGROUND_TINT: [f32; 4] = [0.0, 0.0, 0.0, 0.5];

const Z_BACKGROUND: i16 = 1;
const Z_STRUM: i16 = 2;
const Z_HOLD_BODY: i16 = 3;
const Z_NOTE: i16 = 4;

/// Screen geometry the playfield lays its columns out against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayfieldLayout {
    pub screen_width: f32,
    pub screen_height: f32,
    pub strum_width: f32,
    pub strum_line_y: f32,
}

impl PlayfieldLayout {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            screen_width: cfg.screen_width as f32,
            screen_height: cfg.screen_height as f32,
            strum_width: cfg.strum_width,
            strum_line_y: cfg.strum_line_y(),
        }
    }

    /// Left edge of the first column when `key_count` columns are centred.
    #[inline(always)]
    pub fn start_x(&self, key_count: usize) -> f32 {
        (self.screen_width - self.strum_width * key_count as f32) / 2.0
    }

    #[inline(always)]
    pub fn column_x(&self, key_count: usize, column: usize) -> f32 {
        self.start_x(key_count) + column as f32 * self.strum_width
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strum {
    pub column: usize,
    pub position: Vec2,
    pub size: Vec2,
    pub opacity: f32,
    pub pressed: bool,
}

impl Strum {
    fn update(&mut self) {
        self.opacity = if self.pressed { STRUM_PRESSED_OPACITY } else { 1.0 };
    }
}

struct NoteLoader {
    rx: Receiver<Vec<Note>>,
    handle: Option<JoinHandle<()>>,
}

impl NoteLoader {
    fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Note loading thread panicked.");
        }
    }
}

/// Builds playable notes for every chart note that fits in `key_count` columns.
pub fn build_notes(
    chart_notes: &[ChartNote],
    key_count: usize,
    layout: &PlayfieldLayout,
) -> Vec<Note> {
    let mut notes = Vec::with_capacity(chart_notes.len());
    let mut skipped = 0usize;
    for chart_note in chart_notes {
        if chart_note.column >= key_count {
            skipped += 1;
            continue;
        }
        let mut note = Note::from_chart(
            chart_note.column,
            chart_note.time,
            chart_note.end_time,
            chart_note.note_type,
        );
        note.position = Vec2::new(layout.column_x(key_count, chart_note.column), SPAWN_Y);
        note.size = Vec2::splat(layout.strum_width);
        note.set_can_render(false);
        notes.push(note);
    }
    info!(
        "Created {} notes, skipped {} outside {} columns.",
        notes.len(),
        skipped,
        key_count
    );
    notes
}

/// Drives strums and notes against the conductor clock and emits quads.
pub struct Playfield {
    key_count: usize,
    layout: PlayfieldLayout,
    scroll: ScrollSpeedCalculator,
    strums: Vec<Strum>,
    notes: Vec<Note>,
    loader: Option<NoteLoader>,
    visible: bool,
}

impl Playfield {
    pub fn new<A: AudioHandle>(
        chart: Option<&ChartData>,
        conductor: &Conductor<A>,
        key_count: usize,
        layout: PlayfieldLayout,
        scroll_speed: f32,
    ) -> Self {
        info!("Creating playfield with {key_count} keys, scroll speed: {scroll_speed}");

        let strums = (0..key_count)
            .map(|column| Strum {
                column,
                position: Vec2::new(layout.column_x(key_count, column), layout.strum_line_y),
                size: Vec2::splat(layout.strum_width),
                opacity: 1.0,
                pressed: false,
            })
            .collect();

        let loader = chart.map(|chart| {
            debug!(
                "Starting background note loading for {} chart notes.",
                chart.notes.len()
            );
            let chart_notes = chart.notes.clone();
            let (tx, rx) = mpsc::channel();
            let handle = std::thread::spawn(move || {
                let notes = build_notes(&chart_notes, key_count, &layout);
                let _ = tx.send(notes);
            });
            NoteLoader {
                rx,
                handle: Some(handle),
            }
        });

        let mut scroll = ScrollSpeedCalculator::for_conductor(conductor);
        scroll.set_setting(ScrollSpeedSetting::CMod(scroll_speed / conductor.playback_rate()));

        Self {
            key_count,
            layout,
            scroll,
            strums,
            notes: Vec::new(),
            loader,
            visible: true,
        }
    }

    #[inline(always)]
    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }

    /// Swaps in the background-built notes if they are ready. Returns `true`
    /// once loading is over.
    pub fn poll_loaded_notes(&mut self) -> bool {
        let Some(loader) = self.loader.as_mut() else {
            return true;
        };
        match loader.rx.try_recv() {
            Ok(notes) => {
                self.notes = notes;
                loader.join();
                self.loader = None;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                warn!("Note loading finished without producing notes.");
                loader.join();
                self.loader = None;
                true
            }
        }
    }

    /// Blocks until background note loading is over.
    pub fn finish_loading(&mut self) {
        let Some(mut loader) = self.loader.take() else {
            return;
        };
        match loader.rx.recv() {
            Ok(notes) => self.notes = notes,
            Err(_) => warn!("Note loading finished without producing notes."),
        }
        loader.join();
    }

    pub fn update<A: AudioHandle>(&mut self, conductor: &Conductor<A>, delta_time: f32) {
        for strum in &mut self.strums {
            strum.update();
        }

        if !self.poll_loaded_notes() {
            return;
        }

        let song_position = conductor.song_position();
        let strum_line_y = self.layout.strum_line_y;
        let screen_height = self.layout.screen_height;

        for note in &mut self.notes {
            if note.is_despawned() {
                note.set_can_render(false);
                continue;
            }

            let mut y = self
                .scroll
                .calculate_note_y_position(note.time, song_position, strum_line_y);
            note.position.y = y;

            // Autoplay: everything is hit the moment it reaches the strum line.
            if song_position >= note.time && !note.is_pressed() {
                note.set_pressed(true);
                if let Some(hold) = note.hold_mut() {
                    hold.holding = true;
                }
            }

            let height = note.size.y;
            let pressed = note.is_pressed();
            match note.hold().copied() {
                Some(mut hold) => {
                    if hold.holding && song_position >= hold.end_time {
                        hold.holding = false;
                        note.despawn();
                    } else if !hold.fading_out && !hold.holding && !pressed && y > strum_line_y {
                        hold.fading_out = true;
                    }

                    hold.end_y = self.scroll.calculate_note_y_position(
                        hold.end_time,
                        song_position,
                        strum_line_y,
                    );
                    if hold.holding {
                        y = strum_line_y;
                        note.position.y = y;
                    }
                    if hold.fading_out && hold.end_y > screen_height {
                        note.despawn();
                    }

                    let top_y = y.min(hold.end_y);
                    let bottom_y = (y + height).max(hold.end_y + height);
                    note.set_can_render(!(bottom_y < 0.0 || top_y > screen_height));
                    if let Some(h) = note.hold_mut() {
                        *h = hold;
                    }
                }
                None => {
                    if y > strum_line_y + height {
                        note.despawn();
                    }
                    note.set_can_render(!(y < -height || y > screen_height));
                }
            }

            note.update(delta_time);
        }
    }

    pub fn render(&self, renderer: &mut impl QuadRenderer) {
        if !self.visible {
            return;
        }
        renderer.begin();

        let lanes = self.key_count as f32;
        renderer.draw_quad(&Quad::solid(
            Vec2::new(self.layout.start_x(self.key_count), 0.0),
            Vec2::new(self.layout.strum_width * lanes, self.layout.screen_height),
            LANE_BACKGROUND_TINT,
            Z_BACKGROUND,
        ));

        for strum in &self.strums {
            let quad = Quad::sprite("strum.png", strum.position, strum.size, Z_STRUM);
            renderer.draw_quad(&quad.with_opacity(strum.opacity));
        }

        if !self.is_loading() {
            for note in self.notes.iter().filter(|n| n.should_draw()) {
                if let Some(hold) = note.hold() {
                    let head_y = note.position.y;
                    let length = (hold.end_y - head_y).abs();
                    if length > 0.0 {
                        let body_top = head_y.min(hold.end_y) + note.size.y / 2.0;
                        let body = Quad::sprite(
                            format!("holdBody{}.png", note.column),
                            Vec2::new(note.position.x, body_top),
                            Vec2::new(note.size.x, length),
                            Z_HOLD_BODY,
                        );
                        renderer.draw_quad(&body.with_opacity(note.opacity));
                    }
                    let tail = Quad::sprite(
                        format!("holdEnd{}.png", note.column),
                        Vec2::new(note.position.x, hold.end_y),
                        note.size,
                        Z_HOLD_BODY,
                    );
                    renderer.draw_quad(&tail.with_opacity(note.opacity));
                }
                let head = Quad::sprite(note.texture.as_str(), note.position, note.size, Z_NOTE);
                renderer.draw_quad(&head.with_opacity(note.opacity));
            }
        }

        renderer.end();
    }

    pub fn press_strum(&mut self, column: usize, pressed: bool) {
        if let Some(strum) = self.strums.get_mut(column) {
            strum.pressed = pressed;
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    #[inline(always)]
    pub fn scroll(&self) -> &ScrollSpeedCalculator {
        &self.scroll
    }

    #[inline(always)]
    pub fn scroll_mut(&mut self) -> &mut ScrollSpeedCalculator {
        &mut self.scroll
    }

    #[inline(always)]
    pub fn strums(&self) -> &[Strum] {
        &self.strums
    }

    #[inline(always)]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Notes that have not despawned yet.
    pub fn active_notes(&self) -> usize {
        self.notes.iter().filter(|n| !n.is_despawned()).count()
    }

    #[inline(always)]
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    #[inline(always)]
    pub fn layout(&self) -> &PlayfieldLayout {
        &self.layout
    }

    /// Total width and height covered by the strums.
    pub fn size(&self) -> Vec2 {
        self.strums.iter().fold(Vec2::ZERO, |acc, s| {
            Vec2::new(acc.x + s.size.x, acc.y.max(s.size.y))
        })
    }
}

impl Drop for Playfield {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.as_mut() {
            loader.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Playfield, PlayfieldLayout};
    use crate::core::audio::{SoftwareDevice, SoftwareTrack};
    use crate::core::gfx::{Quad, QuadCounter, QuadRenderer, SOLID_TEXTURE};
    use crate::game::chart::{ChartData, ChartNote};
    use crate::game::conductor::Conductor;
    use crate::game::scroll::ScrollSpeedSetting;
    use crate::game::timing::TimingPoint;

    const LAYOUT: PlayfieldLayout = PlayfieldLayout {
        screen_width: 1280.0,
        screen_height: 720.0,
        strum_width: 96.0,
        strum_line_y: 592.0,
    };

    fn chart(notes: Vec<ChartNote>) -> ChartData {
        ChartData {
            notes,
            timing_points: vec![TimingPoint::new(0.0, 120.0, 4, 4)],
            ..Default::default()
        }
    }

    fn conductor(chart: &ChartData) -> Conductor<SoftwareTrack> {
        let device = SoftwareDevice::new(48_000, 480);
        let track = device.open_track(30.0);
        Conductor::new(&device, Some(track), chart.timeline())
    }

    /// Keeps what each frame asked for, in draw order.
    #[derive(Default)]
    struct Recorder {
        quads: Vec<(String, [f32; 4], [f32; 4], i16)>,
    }

    impl QuadRenderer for Recorder {
        fn begin(&mut self) {
            self.quads.clear();
        }

        fn draw_quad(&mut self, quad: &Quad<'_>) {
            let rect = [quad.position.x, quad.position.y, quad.size.x, quad.size.y];
            self.quads
                .push((quad.texture_id.to_string(), rect, quad.tint, quad.z));
        }
    }

    fn loaded(chart: &ChartData, conductor: &Conductor<SoftwareTrack>) -> Playfield {
        let mut playfield = Playfield::new(Some(chart), conductor, 4, LAYOUT, 1600.0);
        playfield.finish_loading();
        playfield
    }

    #[test]
    fn strums_are_centred_on_the_strum_line() {
        let chart = chart(Vec::new());
        let conductor = conductor(&chart);
        let playfield = Playfield::new(None, &conductor, 4, LAYOUT, 1600.0);
        let xs: Vec<f32> = playfield.strums().iter().map(|s| s.position.x).collect();
        assert_eq!(xs, vec![448.0, 544.0, 640.0, 736.0]);
        assert!(playfield.strums().iter().all(|s| s.position.y == 592.0));
        assert_eq!(playfield.size().x, 384.0);
        assert!(!playfield.is_loading());
    }

    #[test]
    fn initial_speed_is_cmod_scaled_by_rate() {
        let chart = chart(Vec::new());
        let mut conductor = conductor(&chart);
        conductor.set_playback_rate(2.0);
        let playfield = Playfield::new(None, &conductor, 4, LAYOUT, 1600.0);
        assert_eq!(playfield.scroll().setting(), ScrollSpeedSetting::CMod(800.0));
    }

    #[test]
    fn background_loading_skips_out_of_range_columns() {
        let chart = chart(vec![
            ChartNote::tap(0, 1.0),
            ChartNote::tap(5, 1.5),
            ChartNote::tap(3, 2.0),
        ]);
        let conductor = conductor(&chart);
        let mut playfield = Playfield::new(Some(&chart), &conductor, 4, LAYOUT, 1600.0);
        assert!(playfield.is_loading(), "notes are only swapped in by polling");
        playfield.finish_loading();
        assert!(!playfield.is_loading());
        let xs: Vec<f32> = playfield.notes().iter().map(|n| n.position.x).collect();
        assert_eq!(xs, vec![448.0, 736.0]);
        assert!(playfield.notes().iter().all(|n| !n.can_render()));
    }

    #[test]
    fn tap_note_lifecycle() {
        let chart = chart(vec![ChartNote::tap(0, 1.0)]);
        let mut conductor = conductor(&chart);
        let mut playfield = loaded(&chart, &conductor);

        conductor.seek(0.0);
        playfield.update(&conductor, 0.016);
        assert!(!playfield.notes()[0].can_render(), "far above the screen");

        conductor.seek(0.7);
        playfield.update(&conductor, 0.016);
        let note = &playfield.notes()[0];
        assert!(note.can_render());
        assert!(!note.is_pressed());
        assert!((note.position.y - 80.0).abs() < 0.01, "got {}", note.position.y);

        conductor.seek(1.0);
        playfield.update(&conductor, 0.016);
        assert!(playfield.notes()[0].is_pressed());
        assert!(!playfield.notes()[0].should_draw(), "pressed taps are hidden");

        conductor.seek(1.2);
        playfield.update(&conductor, 0.016);
        assert!(playfield.notes()[0].is_despawned());
        assert_eq!(playfield.active_notes(), 0);
    }

    #[test]
    fn held_hold_is_pinned_then_despawns_at_end() {
        let chart = chart(vec![ChartNote::hold(2, 1.0, 2.0)]);
        let mut conductor = conductor(&chart);
        let mut playfield = loaded(&chart, &conductor);

        conductor.seek(1.5);
        playfield.update(&conductor, 0.016);
        let note = &playfield.notes()[0];
        let hold = note.hold().expect("hold body");
        assert!(hold.holding);
        assert_eq!(note.position.y, 592.0);
        assert!(hold.end_y < 592.0);
        assert!(note.can_render() && note.should_draw());

        let mut counter = QuadCounter::default();
        playfield.render(&mut counter);
        assert_eq!(
            counter.frame_quads,
            1 + 4 + 3,
            "background, strums, then body, tail and head"
        );

        conductor.seek(2.0);
        playfield.update(&conductor, 0.016);
        assert!(playfield.notes()[0].is_despawned());
        playfield.render(&mut counter);
        assert_eq!(counter.frame_quads, 1 + 4);
    }

    #[test]
    fn unheld_hold_fades_and_despawns_past_the_bottom() {
        let chart = chart(vec![
            ChartNote::hold(0, 0.6, 0.7),
            ChartNote::hold(1, 0.6, 1.0),
        ]);
        let mut conductor = conductor(&chart);
        let mut playfield = loaded(&chart, &conductor);
        // Reverse scroll puts upcoming notes below the strum line.
        playfield.scroll_mut().set_cmod(-480.0);

        conductor.seek(0.5);
        playfield.update(&conductor, 0.1);
        let short = &playfield.notes()[0];
        assert!(short.hold().is_some_and(|h| h.fading_out && !h.holding));
        assert!(!short.is_despawned(), "tail is still on screen");
        assert!((short.opacity - 0.8).abs() < 1e-5, "got {}", short.opacity);

        assert!(playfield.notes()[1].is_despawned(), "tail already past the bottom");
    }

    #[test]
    fn strums_dim_while_pressed_even_during_loading() {
        let chart = chart(vec![ChartNote::tap(0, 1.0)]);
        let conductor = conductor(&chart);
        let mut playfield = Playfield::new(Some(&chart), &conductor, 4, LAYOUT, 1600.0);
        playfield.press_strum(1, true);
        playfield.update(&conductor, 0.016);
        assert!((playfield.strums()[1].opacity - 0.8).abs() < f32::EPSILON);
        assert_eq!(playfield.strums()[0].opacity, 1.0);
        playfield.press_strum(1, false);
        playfield.update(&conductor, 0.016);
        assert_eq!(playfield.strums()[1].opacity, 1.0);
    }

    #[test]
    fn hidden_playfield_draws_nothing() {
        let chart = chart(Vec::new());
        let conductor = conductor(&chart);
        let mut playfield = Playfield::new(None, &conductor, 7, LAYOUT, 1600.0);
        let mut counter = QuadCounter::default();
        playfield.render(&mut counter);
        assert_eq!(counter.frame_quads, 1 + 7);
        playfield.set_visible(false);
        playfield.render(&mut counter);
        assert_eq!(counter.total_quads, 1 + 7);
    }

    #[test]
    fn lane_background_is_drawn_beneath_the_strums() {
        let chart = chart(vec![ChartNote::tap(1, 0.5)]);
        let mut conductor = conductor(&chart);
        let mut playfield = loaded(&chart, &conductor);
        conductor.seek(0.2);
        playfield.update(&conductor, 0.016);

        let mut recorder = Recorder::default();
        playfield.render(&mut recorder);
        assert_eq!(recorder.quads.len(), 1 + 4 + 1);

        let (texture, rect, tint, z) = &recorder.quads[0];
        assert_eq!(texture, SOLID_TEXTURE);
        assert_eq!(*rect, [448.0, 0.0, 384.0, 720.0]);
        assert_eq!(*tint, [0.0, 0.0, 0.0, 0.5]);
        assert!(recorder.quads[1..].iter().all(|q| q.3 > *z));
        assert!(recorder.quads[1..].iter().all(|q| q.2 == [1.0; 4]));
    }
}
