use super::hearts::heart_contains;
use super::{CELL_PX, Effect};
use std::f32::consts::PI;
use std::io::{BufWriter, Stdout};

// Rocket shell colors: reds, pinks and gold.
const COLORS: [(u8, u8, u8); 6] = [
    (230, 57, 70),
    (255, 107, 122),
    (255, 179, 193),
    (255, 215, 0),
    (255, 143, 163),
    (193, 18, 31),
];

// Per-frame motion constants at 60Hz, scaled by dt * 60 when stepping.
const ROCKET_GRAVITY: f32 = 0.3;
const FRAGMENT_GRAVITY: f32 = 0.15;
const FRAGMENT_DRAG: f32 = 0.98;
const LIFE_DECAY: f32 = 0.015;

const TRAIL_LEN: usize = 10;
const MAX_ALIVE: usize = 8;
const INITIAL_BURST: usize = 5;
const BURST_STAGGER: f32 = 0.3;
const TRICKLE_INTERVAL: f32 = 0.4;

// Previous-frame attenuation; the surface is never cleared, so motion leaves
// a fading afterglow.
const AFTERGLOW: f32 = 0.9;

#[derive(Clone, Copy)]
enum FragmentShape {
    Circle,
    Heart,
}

struct Fragment {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    life: f32,
    size: f32,
    color: (u8, u8, u8),
    shape: FragmentShape,
}

// Last few rocket positions, oldest first. Fixed ring, no allocation.
struct Trail {
    points: [(f32, f32); TRAIL_LEN],
    head: usize,
    len: usize,
}

impl Trail {
    fn new() -> Self {
        Self {
            points: [(0.0, 0.0); TRAIL_LEN],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, x: f32, y: f32) {
        self.points[self.head] = (x, y);
        self.head = (self.head + 1) % TRAIL_LEN;
        self.len = (self.len + 1).min(TRAIL_LEN);
    }

    fn iter(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        let start = (self.head + TRAIL_LEN - self.len) % TRAIL_LEN;
        (0..self.len).map(move |i| self.points[(start + i) % TRAIL_LEN])
    }
}

struct Rocket {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    target_y: f32,
    color: (u8, u8, u8),
    exploded: bool,
    trail: Trail,
    fragments: Vec<Fragment>,
}

// Rockets rise, explode into circle/heart fragments and fade. Spawn
// staggering runs off the simulation clock, so dropping the sim cancels every
// pending launch.
pub struct FireworksSim {
    width: f32,
    height: f32,
    time: f32,
    next_burst: usize,
    next_trickle: f32,
    rockets: Vec<Rocket>,
    launched: usize,
    retired: usize,
    rng: fastrand::Rng,
}

impl FireworksSim {
    pub fn new(width: f32, height: f32, rng: fastrand::Rng) -> Self {
        Self {
            width,
            height,
            time: 0.0,
            next_burst: 0,
            next_trickle: TRICKLE_INTERVAL,
            rockets: Vec::with_capacity(MAX_ALIVE),
            launched: 0,
            retired: 0,
            rng,
        }
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    fn launch(&mut self) {
        self.rockets.push(Rocket {
            x: self.rng.f32() * self.width * 0.8 + self.width * 0.1,
            y: self.height,
            vx: (self.rng.f32() - 0.5) * 2.0,
            vy: -(self.rng.f32() * 8.0 + 12.0),
            target_y: self.rng.f32() * self.height * 0.4 + self.height * 0.1,
            color: COLORS[self.rng.usize(0..COLORS.len())],
            exploded: false,
            trail: Trail::new(),
            fragments: Vec::new(),
        });
        self.launched += 1;
    }

    pub fn step(&mut self, dt: f32) {
        self.time += dt;
        // Wrap time to prevent floating point precision issues
        if self.time > 10000.0 {
            self.time -= 10000.0;
            self.next_trickle -= 10000.0;
        }

        // Opening volley: a few staggered launches, cap-exempt.
        while self.next_burst < INITIAL_BURST
            && self.time >= self.next_burst as f32 * BURST_STAGGER
        {
            self.launch();
            self.next_burst += 1;
        }

        // Steady trickle while the sky is not yet full. Rockets still fading
        // out count against the cap.
        while self.time >= self.next_trickle {
            if self.rockets.len() < MAX_ALIVE {
                self.launch();
            }
            self.next_trickle += TRICKLE_INTERVAL;
        }

        let k = dt * 60.0;
        let drag = FRAGMENT_DRAG.powf(k);
        let rng = &mut self.rng;

        for rocket in &mut self.rockets {
            if !rocket.exploded {
                rocket.x += rocket.vx * k;
                rocket.y += rocket.vy * k;
                rocket.vy += ROCKET_GRAVITY * k;
                rocket.trail.push(rocket.x, rocket.y);

                // Apex: stopped rising, or reached the target band.
                if rocket.vy >= 0.0 || rocket.y <= rocket.target_y {
                    rocket.exploded = true;
                    burst(rng, rocket);
                }
            } else {
                rocket.fragments.retain_mut(|f| {
                    f.x += f.vx * k;
                    f.y += f.vy * k;
                    f.vy += FRAGMENT_GRAVITY * k;
                    f.vx *= drag;
                    f.life -= LIFE_DECAY * k;
                    f.life > 0.0
                });
            }
        }

        let retired = &mut self.retired;
        self.rockets.retain(|r| {
            if r.exploded && r.fragments.is_empty() {
                *retired += 1;
                false
            } else {
                true
            }
        });
    }

    // Additive rasterization into a glow frame. Oldest rockets paint first.
    pub fn paint(&self, frame: &mut [(f32, f32, f32)], cols: usize, rows: usize) {
        for rocket in &self.rockets {
            if !rocket.exploded {
                let mut prev: Option<(f32, f32)> = None;
                for (tx, ty) in rocket.trail.iter() {
                    if let Some((px, py)) = prev {
                        draw_line(frame, cols, rows, px, py, tx, ty, rocket.color, 0.45);
                    }
                    prev = Some((tx, ty));
                }
                plot(frame, cols, rows, rocket.x, rocket.y, rocket.color, 1.0);
                halo(frame, cols, rows, rocket.x, rocket.y, rocket.color, 0.35);
            } else {
                for f in &rocket.fragments {
                    match f.shape {
                        FragmentShape::Circle => {
                            plot(frame, cols, rows, f.x, f.y, f.color, f.life)
                        }
                        // Cells are coarse; stamp hearts larger than their
                        // simulated size so the shape survives the grid.
                        FragmentShape::Heart => {
                            stamp_heart(frame, cols, rows, f.x, f.y, f.size * 3.0, f.color, f.life)
                        }
                    }
                }
            }
        }
    }
}

fn burst(rng: &mut fastrand::Rng, rocket: &mut Rocket) {
    let count = 40 + (rng.f32() * 30.0).ceil() as usize;
    rocket.fragments.reserve(count);
    for i in 0..count {
        // Even spread around the circle with per-fragment jitter.
        let angle = PI * 2.0 * i as f32 / count as f32 + rng.f32() * 0.5;
        let speed = rng.f32() * 6.0 + 2.0;
        rocket.fragments.push(Fragment {
            x: rocket.x,
            y: rocket.y,
            vx: angle.cos() * speed,
            vy: angle.sin() * speed,
            life: 1.0,
            size: rng.f32() * 4.0 + 2.0,
            color: rocket.color,
            shape: if rng.usize(0..4) == 0 {
                FragmentShape::Heart
            } else {
                FragmentShape::Circle
            },
        });
    }
}

fn add_px(frame: &mut [(f32, f32, f32)], idx: usize, color: (u8, u8, u8), alpha: f32) {
    let px = &mut frame[idx];
    px.0 = (px.0 + color.0 as f32 * alpha).min(255.0);
    px.1 = (px.1 + color.1 as f32 * alpha).min(255.0);
    px.2 = (px.2 + color.2 as f32 * alpha).min(255.0);
}

fn plot(
    frame: &mut [(f32, f32, f32)],
    cols: usize,
    rows: usize,
    x: f32,
    y: f32,
    color: (u8, u8, u8),
    alpha: f32,
) {
    if alpha <= 0.0 {
        return;
    }
    let cx = (x / CELL_PX).floor() as i32;
    let cy = (y / CELL_PX).floor() as i32;
    if cx >= 0 && cx < cols as i32 && cy >= 0 && cy < rows as i32 {
        add_px(frame, cy as usize * cols + cx as usize, color, alpha);
    }
}

fn halo(
    frame: &mut [(f32, f32, f32)],
    cols: usize,
    rows: usize,
    x: f32,
    y: f32,
    color: (u8, u8, u8),
    alpha: f32,
) {
    for (dx, dy) in [(-1.0, 0.0), (1.0, 0.0), (0.0, -1.0), (0.0, 1.0)] {
        plot(
            frame,
            cols,
            rows,
            x + dx * CELL_PX,
            y + dy * CELL_PX,
            color,
            alpha,
        );
    }
}

fn draw_line(
    frame: &mut [(f32, f32, f32)],
    cols: usize,
    rows: usize,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    color: (u8, u8, u8),
    alpha: f32,
) {
    let dx = (x1 - x0) / CELL_PX;
    let dy = (y1 - y0) / CELL_PX;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        plot(
            frame,
            cols,
            rows,
            x0 + (x1 - x0) * t,
            y0 + (y1 - y0) * t,
            color,
            alpha,
        );
    }
}

fn stamp_heart(
    frame: &mut [(f32, f32, f32)],
    cols: usize,
    rows: usize,
    x: f32,
    y: f32,
    size: f32,
    color: (u8, u8, u8),
    alpha: f32,
) {
    if size < CELL_PX {
        plot(frame, cols, rows, x, y, color, alpha);
        return;
    }
    let cx_min = ((x - size) / CELL_PX).floor().max(0.0) as usize;
    let cx_max = ((x + size) / CELL_PX).ceil().min(cols as f32) as usize;
    let cy_min = ((y - size) / CELL_PX).floor().max(0.0) as usize;
    let cy_max = ((y + size) / CELL_PX).ceil().min(rows as f32) as usize;
    for cy in cy_min..cy_max {
        for cx in cx_min..cx_max {
            let dx = (cx as f32 + 0.5) * CELL_PX - x;
            let dy = (cy as f32 + 0.5) * CELL_PX - y;
            if heart_contains(dx, dy, size) {
                add_px(frame, cy * cols + cx, color, alpha);
            }
        }
    }
}

pub struct FireworksEffect {
    width: usize,
    height: usize,
    sim: FireworksSim,
    frame: Vec<(f32, f32, f32)>,
    output_buf: Vec<u8>,
}

impl FireworksEffect {
    fn backdrop() -> (f32, f32, f32) {
        let bg = crate::get_bg_color();
        (bg.0 as f32, bg.1 as f32, bg.2 as f32)
    }
}

impl Effect for FireworksEffect {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            sim: FireworksSim::new(
                width as f32 * CELL_PX,
                height as f32 * CELL_PX,
                fastrand::Rng::new(),
            ),
            frame: vec![Self::backdrop(); width * height],
            output_buf: Vec::with_capacity(width * height * 25),
        }
    }

    fn update(&mut self, dt: f32) {
        self.sim.step(dt);
    }

    fn render(&mut self, stdout: &mut BufWriter<Stdout>) -> std::io::Result<()> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        // Translucent overpaint instead of a clear: attenuate the previous
        // frame toward the backdrop.
        let bg = Self::backdrop();
        for px in &mut self.frame {
            px.0 = bg.0 + (px.0 - bg.0) * AFTERGLOW;
            px.1 = bg.1 + (px.1 - bg.1) * AFTERGLOW;
            px.2 = bg.2 + (px.2 - bg.2) * AFTERGLOW;
        }

        self.sim.paint(&mut self.frame, self.width, self.height);
        super::write_frame(stdout, &self.frame, self.width, self.height, &mut self.output_buf)
    }

    fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        // The afterglow buffer does not survive a resize; the next frame
        // repaints from the live sim.
        self.frame = vec![Self::backdrop(); width * height];
        self.sim
            .set_viewport(width as f32 * CELL_PX, height as f32 * CELL_PX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn sim() -> FireworksSim {
        FireworksSim::new(1280.0, 720.0, fastrand::Rng::with_seed(11))
    }

    #[test]
    fn rocket_explodes_exactly_once_with_burst_in_range() {
        let mut sim = sim();
        sim.step(DT);
        assert_eq!(sim.rockets.len(), 1);

        let mut exploded = false;
        for _ in 0..600 {
            let was = sim.rockets[0].exploded;
            sim.step(DT);
            let rocket = &sim.rockets[0];
            if !was && rocket.exploded {
                assert!(
                    (40..=70).contains(&rocket.fragments.len()),
                    "burst size {}",
                    rocket.fragments.len()
                );
                exploded = true;
                break;
            }
        }
        assert!(exploded, "rocket never reached its apex");
    }

    #[test]
    fn fragment_life_decreases_until_removal() {
        let mut sim = sim();
        // Run to the first explosion.
        while sim.rockets.first().is_none_or(|r| !r.exploded) {
            sim.step(DT);
        }

        loop {
            let before: Vec<f32> = sim.rockets[0].fragments.iter().map(|f| f.life).collect();
            let retired = sim.retired;
            sim.step(DT);
            if sim.retired > retired {
                break;
            }
            let after = &sim.rockets[0].fragments;
            assert_eq!(after.len(), before.len());
            for (f, old) in after.iter().zip(&before) {
                assert!(f.life < *old, "life must strictly decrease");
                assert!(f.life > 0.0, "dead fragments must be dropped");
            }
        }
    }

    #[test]
    fn no_fragment_survives_with_non_positive_life() {
        let mut sim = sim();
        for _ in 0..3000 {
            sim.step(DT);
            for rocket in &sim.rockets {
                for f in &rocket.fragments {
                    assert!(f.life > 0.0 && f.life <= 1.0);
                }
            }
        }
    }

    #[test]
    fn alive_rockets_never_exceed_the_cap() {
        let mut sim = sim();
        for _ in 0..6000 {
            sim.step(DT);
            assert!(sim.rockets.len() <= MAX_ALIVE);
        }
        assert!(sim.launched > INITIAL_BURST, "trickle never fired");
    }

    #[test]
    fn three_seconds_fully_fades_at_least_one_rocket() {
        // 3000ms at 60Hz, fixed seed: the opening volley must have at least
        // one rocket rise, explode and burn out completely.
        let mut sim = FireworksSim::new(1280.0, 720.0, fastrand::Rng::with_seed(2));
        for _ in 0..180 {
            sim.step(DT);
        }
        assert!(sim.launched >= INITIAL_BURST);
        assert!(sim.retired >= 1, "no rocket fully faded within 3s");
    }

    #[test]
    fn trail_keeps_last_ten_points_in_order() {
        let mut trail = Trail::new();
        for i in 0..15 {
            trail.push(i as f32, 0.0);
        }
        assert_eq!(trail.len, TRAIL_LEN);
        let xs: Vec<f32> = trail.iter().map(|(x, _)| x).collect();
        assert_eq!(xs, (5..15).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn trails_stay_bounded_during_flight() {
        let mut sim = sim();
        for _ in 0..600 {
            sim.step(DT);
            for rocket in &sim.rockets {
                assert!(rocket.trail.len <= TRAIL_LEN);
            }
        }
    }

    #[test]
    fn launches_start_in_the_lower_band_toward_an_upper_target() {
        let mut sim = sim();
        sim.step(DT);
        // One step in: launched from the bottom edge, one frame of rise.
        let rocket = &sim.rockets[0];
        assert!(rocket.y < 720.0 && rocket.y >= 700.0);
        assert!(rocket.x >= 127.0 && rocket.x <= 1153.0);
        assert!(rocket.target_y >= 72.0 && rocket.target_y <= 360.0);
        assert!(rocket.vy < 0.0, "rockets launch upward");
        assert_eq!(rocket.trail.len, 1);
    }
}
