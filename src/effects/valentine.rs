use super::fireworks::FireworksSim;
use super::hearts::Heartfield;
use super::{CELL_PX, Effect};
use crossterm::event::{Event, KeyCode};
use std::io::{BufWriter, Stdout};

// How long the fireworks stay up after the letter is opened.
const SHOW_SECONDS: f32 = 3.0;
const AFTERGLOW: f32 = 0.9;

// The greeting scene: the ambient heart field runs for the whole session;
// opening the letter (Enter or Space) puts on a bounded fireworks show that is
// torn down once its window ends.
pub struct ValentineEffect {
    width: usize,
    height: usize,
    hearts: Heartfield,
    show: Option<FireworksSim>,
    show_left: f32,
    rng: fastrand::Rng,
    frame: Vec<(f32, f32, f32)>,
    glow: Vec<(f32, f32, f32)>,
    output_buf: Vec<u8>,
}

impl ValentineEffect {
    fn open_envelope(&mut self) {
        if self.show.is_some() {
            return;
        }
        self.show = Some(FireworksSim::new(
            self.width as f32 * CELL_PX,
            self.height as f32 * CELL_PX,
            self.rng.fork(),
        ));
        self.show_left = SHOW_SECONDS;
    }

    // Drops the sim, and with it every pending launch.
    fn close_show(&mut self) {
        self.show = None;
        self.show_left = 0.0;
        self.glow.fill((0.0, 0.0, 0.0));
    }
}

impl Effect for ValentineEffect {
    fn new(width: usize, height: usize) -> Self {
        let mut rng = fastrand::Rng::new();
        let hearts = Heartfield::new(
            width as f32 * CELL_PX,
            height as f32 * CELL_PX,
            rng.fork(),
        );
        Self {
            width,
            height,
            hearts,
            show: None,
            show_left: 0.0,
            rng,
            frame: vec![(0.0, 0.0, 0.0); width * height],
            glow: vec![(0.0, 0.0, 0.0); width * height],
            output_buf: Vec::with_capacity(width * height * 25),
        }
    }

    fn update(&mut self, dt: f32) {
        self.hearts.step(dt);

        if let Some(sim) = &mut self.show {
            sim.step(dt);
            self.show_left -= dt;
        }
        if self.show.is_some() && self.show_left <= 0.0 {
            self.close_show();
        }
    }

    fn render(&mut self, stdout: &mut BufWriter<Stdout>) -> std::io::Result<()> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        super::fill_background(&mut self.frame, self.width, self.height);
        self.hearts.paint(&mut self.frame, self.width, self.height);

        // The show paints onto its own afterglow layer, composited over the
        // scene, so rockets streak while the hearts stay crisp.
        for px in &mut self.glow {
            px.0 *= AFTERGLOW;
            px.1 *= AFTERGLOW;
            px.2 *= AFTERGLOW;
        }
        if let Some(sim) = &self.show {
            sim.paint(&mut self.glow, self.width, self.height);
        }
        for (px, glow) in self.frame.iter_mut().zip(&self.glow) {
            px.0 = (px.0 + glow.0).min(255.0);
            px.1 = (px.1 + glow.1).min(255.0);
            px.2 = (px.2 + glow.2).min(255.0);
        }

        super::write_frame(stdout, &self.frame, self.width, self.height, &mut self.output_buf)
    }

    fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.frame = vec![(0.0, 0.0, 0.0); width * height];
        self.glow = vec![(0.0, 0.0, 0.0); width * height];
        let (w, h) = (width as f32 * CELL_PX, height as f32 * CELL_PX);
        self.hearts.set_viewport(w, h);
        if let Some(sim) = &mut self.show {
            sim.set_viewport(w, h);
        }
    }

    fn handle_event(&mut self, event: &Event) {
        if let Event::Key(key) = event {
            if key.code == KeyCode::Enter || key.code == KeyCode::Char(' ') {
                self.open_envelope();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn envelope_opens_a_bounded_show_window() {
        let mut scene = ValentineEffect::new(160, 100);
        assert!(scene.show.is_none());

        scene.open_envelope();
        assert!(scene.show.is_some());

        // 3000ms of frames (plus slack for float accumulation).
        for _ in 0..200 {
            scene.update(DT);
        }
        assert!(scene.show.is_none(), "show must end after its window");
        assert_eq!(scene.show_left, 0.0);
    }

    #[test]
    fn closing_the_show_drops_all_fireworks_state() {
        let mut scene = ValentineEffect::new(160, 100);
        scene.open_envelope();
        scene.update(DT);

        scene.close_show();
        assert!(scene.show.is_none());
        assert!(
            scene.glow.iter().all(|&(r, g, b)| r == 0.0 && g == 0.0 && b == 0.0),
            "afterglow layer must be blanked on teardown"
        );
    }

    #[test]
    fn ambient_field_outlives_the_show() {
        let mut scene = ValentineEffect::new(160, 100);
        scene.open_envelope();
        for _ in 0..400 {
            scene.update(DT);
        }
        // Hearts keep drifting after the show is gone.
        let before: Vec<f32> = scene.hearts.particle_ys();
        scene.update(DT);
        assert_ne!(before, scene.hearts.particle_ys());
    }

    #[test]
    fn envelope_can_be_reopened_after_the_window() {
        let mut scene = ValentineEffect::new(160, 100);
        scene.open_envelope();
        for _ in 0..200 {
            scene.update(DT);
        }
        assert!(scene.show.is_none());

        scene.open_envelope();
        assert!(scene.show.is_some());
    }

    #[test]
    fn opening_twice_keeps_the_running_show() {
        let mut scene = ValentineEffect::new(160, 100);
        scene.open_envelope();
        for _ in 0..60 {
            scene.update(DT);
        }
        let left = scene.show_left;
        scene.open_envelope();
        assert_eq!(scene.show_left, left, "reopening must not restart the window");
    }
}
