use crate::game::chart::NoteType;
use bitflags::bitflags;
use glam::Vec2;

// Opacity lost per second by a hold that was let through without being held.
const HOLD_FADE_PER_SECOND: f32 = 2.0;
const HOLD_FADE_FLOOR: f32 = 0.3;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NoteFlags: u8 {
        const CAN_RENDER = 1 << 0;
        const PRESSED    = 1 << 1;
        const DESPAWNED  = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldData {
    pub end_time: f32,
    /// Screen Y of the tail, refreshed every update.
    pub end_y: f32,
    pub holding: bool,
    pub fading_out: bool,
}

impl HoldData {
    pub const fn new(end_time: f32) -> Self {
        Self {
            end_time,
            end_y: 0.0,
            holding: false,
            fading_out: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteBody {
    Tap,
    Mine,
    Hold(HoldData),
}

/// A note as the playfield drives it: chart timing plus screen state.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub column: usize,
    pub time: f32,
    pub body: NoteBody,
    pub texture: String,
    pub position: Vec2,
    pub size: Vec2,
    pub opacity: f32,
    pub flags: NoteFlags,
}

impl Note {
    pub fn new(column: usize, time: f32, body: NoteBody, texture: String) -> Self {
        Self {
            column,
            time,
            body,
            texture,
            position: Vec2::ZERO,
            size: Vec2::splat(64.0),
            opacity: 1.0,
            flags: NoteFlags::empty(),
        }
    }

    pub fn from_chart(column: usize, time: f32, end_time: f32, note_type: NoteType) -> Self {
        let (body, texture) = match note_type {
            NoteType::Hold => (
                NoteBody::Hold(HoldData::new(end_time)),
                column_texture(column),
            ),
            NoteType::Mine => (NoteBody::Mine, "mine.png".to_string()),
            NoteType::Tap | NoteType::Roll => (NoteBody::Tap, column_texture(column)),
        };
        Self::new(column, time, body, texture)
    }

    #[inline(always)]
    pub fn is_hold(&self) -> bool {
        matches!(self.body, NoteBody::Hold(_))
    }

    #[inline(always)]
    pub fn hold(&self) -> Option<&HoldData> {
        match &self.body {
            NoteBody::Hold(h) => Some(h),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn hold_mut(&mut self) -> Option<&mut HoldData> {
        match &mut self.body {
            NoteBody::Hold(h) => Some(h),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn end_time(&self) -> f32 {
        self.hold().map_or(self.time, |h| h.end_time)
    }

    #[inline(always)]
    pub fn is_pressed(&self) -> bool {
        self.flags.contains(NoteFlags::PRESSED)
    }

    #[inline(always)]
    pub fn is_despawned(&self) -> bool {
        self.flags.contains(NoteFlags::DESPAWNED)
    }

    #[inline(always)]
    pub fn can_render(&self) -> bool {
        self.flags.contains(NoteFlags::CAN_RENDER) && !self.is_despawned()
    }

    pub fn set_can_render(&mut self, can_render: bool) {
        self.flags.set(NoteFlags::CAN_RENDER, can_render);
    }

    pub fn set_pressed(&mut self, pressed: bool) {
        self.flags.set(NoteFlags::PRESSED, pressed);
    }

    pub fn despawn(&mut self) {
        self.flags.insert(NoteFlags::DESPAWNED);
        self.flags.remove(NoteFlags::CAN_RENDER);
    }

    /// Whether the note's own sprite should be drawn this frame.
    pub fn should_draw(&self) -> bool {
        if !self.can_render() {
            return false;
        }
        match &self.body {
            NoteBody::Hold(h) => !self.is_pressed() || h.holding,
            NoteBody::Tap | NoteBody::Mine => !self.is_pressed(),
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        if let NoteBody::Hold(h) = &self.body
            && h.fading_out
        {
            self.opacity = (self.opacity - delta_time * HOLD_FADE_PER_SECOND).max(HOLD_FADE_FLOOR);
        }
    }
}

#[inline(always)]
pub fn column_texture(column: usize) -> String {
    format!("note{column}.png")
}

#[cfg(test)]
mod tests {
    use super::{Note, NoteBody, NoteFlags};
    use crate::game::chart::NoteType;

    #[test]
    fn chart_types_map_to_bodies_and_textures() {
        let tap = Note::from_chart(2, 1.0, 1.0, NoteType::Tap);
        assert_eq!(tap.body, NoteBody::Tap);
        assert_eq!(tap.texture, "note2.png");

        let roll = Note::from_chart(1, 1.0, 3.0, NoteType::Roll);
        assert_eq!(roll.body, NoteBody::Tap, "rolls play as taps");

        let mine = Note::from_chart(0, 1.0, 1.0, NoteType::Mine);
        assert_eq!(mine.texture, "mine.png");

        let hold = Note::from_chart(3, 1.0, 2.5, NoteType::Hold);
        assert!(hold.is_hold());
        assert_eq!(hold.end_time(), 2.5);
    }

    #[test]
    fn despawn_clears_render_flag() {
        let mut note = Note::from_chart(0, 0.0, 0.0, NoteType::Tap);
        note.set_can_render(true);
        assert!(note.should_draw());
        note.despawn();
        assert!(!note.can_render());
        assert!(note.flags.contains(NoteFlags::DESPAWNED));
    }

    #[test]
    fn pressed_holds_draw_only_while_held() {
        let mut hold = Note::from_chart(0, 0.0, 1.0, NoteType::Hold);
        hold.set_can_render(true);
        hold.set_pressed(true);
        assert!(!hold.should_draw());
        hold.hold_mut().unwrap().holding = true;
        assert!(hold.should_draw());

        let mut tap = Note::from_chart(0, 0.0, 0.0, NoteType::Tap);
        tap.set_can_render(true);
        tap.set_pressed(true);
        assert!(!tap.should_draw());
    }

    #[test]
    fn fading_hold_loses_opacity_down_to_floor() {
        let mut hold = Note::from_chart(0, 0.0, 1.0, NoteType::Hold);
        hold.update(0.1);
        assert_eq!(hold.opacity, 1.0);
        hold.hold_mut().unwrap().fading_out = true;
        hold.update(0.1);
        assert!((hold.opacity - 0.8).abs() < 1e-6, "got {}", hold.opacity);
        hold.update(10.0);
        assert!((hold.opacity - 0.3).abs() < 1e-6);
    }
}
