use super::{CELL_PX, Effect};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::io::{BufWriter, Stdout};

// Valentine palette: deep red, coral, blush, gold, cream.
const PALETTE: [(u8, u8, u8); 5] = [
    (230, 57, 70),
    (255, 107, 122),
    (255, 179, 193),
    (255, 215, 0),
    (255, 245, 204),
];

const POOL_SIZE: usize = 80;
// Particles wrap once they climb this far past the top edge.
const WRAP_MARGIN: f32 = 50.0;

#[derive(Clone, Copy)]
enum Shape {
    Heart,
    Sparkle,
}

struct AmbientParticle {
    x: f32,
    y: f32,
    size: f32,
    speed_x: f32,
    speed_y: f32,
    opacity: f32,
    rotation: f32,
    rotation_speed: f32,
    shape: Shape,
    color: (u8, u8, u8),
}

impl AmbientParticle {
    fn spawn(rng: &mut fastrand::Rng, width: f32, height: f32) -> Self {
        Self {
            x: rng.f32() * width,
            y: rng.f32() * height,
            size: rng.f32() * 15.0 + 5.0,
            speed_x: (rng.f32() - 0.5) * 0.5,
            speed_y: -rng.f32() * 0.5 - 0.2,
            opacity: rng.f32() * 0.5 + 0.3,
            rotation: rng.f32() * PI * 2.0,
            rotation_speed: (rng.f32() - 0.5) * 0.02,
            shape: if rng.f32() > 0.6 {
                Shape::Heart
            } else {
                Shape::Sparkle
            },
            color: PALETTE[rng.usize(0..PALETTE.len())],
        }
    }
}

// Ambient background field: a fixed pool of drifting hearts and sparkles.
// The pool is allocated once up front; particles leaving the top are recycled
// into the bottom band, never reallocated.
pub struct Heartfield {
    width: f32,
    height: f32,
    time: f32,
    particles: Vec<AmbientParticle>,
    rng: fastrand::Rng,
}

impl Heartfield {
    pub fn new(width: f32, height: f32, mut rng: fastrand::Rng) -> Self {
        let mut particles = Vec::with_capacity(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            particles.push(AmbientParticle::spawn(&mut rng, width, height));
        }
        Self {
            width,
            height,
            time: 0.0,
            particles,
            rng,
        }
    }

    // Positions are not rescaled; the field just gains or loses drift room.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    // Motion constants are per-frame at 60Hz, scaled by dt * 60 so the
    // fixed-step runner reproduces them exactly.
    pub fn step(&mut self, dt: f32) {
        self.time += dt;
        // Wrap time to prevent floating point precision issues
        if self.time > 10000.0 {
            self.time -= 10000.0;
        }

        let k = dt * 60.0;
        for (index, p) in self.particles.iter_mut().enumerate() {
            p.y += p.speed_y * k;
            // Index-phased wobble: organic drift without per-particle state.
            p.x += (p.speed_x + (self.time + index as f32).sin() * 0.3) * k;
            p.rotation += p.rotation_speed * k;
            // Twinkle. Opacity belongs to the particle itself; draw code
            // reads it by identity, never by coordinate lookup.
            p.opacity = 0.3 + (self.time * 2.0 + index as f32).sin() * 0.2;

            if p.y < -WRAP_MARGIN {
                p.y = self.height + WRAP_MARGIN;
                p.x = self.rng.f32() * self.width;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn particle_ys(&self) -> Vec<f32> {
        self.particles.iter().map(|p| p.y).collect()
    }

    pub fn paint(&self, frame: &mut [(f32, f32, f32)], cols: usize, rows: usize) {
        for p in &self.particles {
            match p.shape {
                Shape::Heart => draw_heart(frame, cols, rows, p, p.size),
                Shape::Sparkle => draw_sparkle(frame, cols, rows, p, p.size * 0.6),
            }
        }
    }
}

// Filled heart test in viewport px, relative to the heart's center, in screen
// coordinates (y grows downward). Classic implicit heart curve, flipped so the
// tip points down.
pub(crate) fn heart_contains(dx: f32, dy: f32, size: f32) -> bool {
    if size <= 0.0 {
        return false;
    }
    let s = size * 0.6;
    let nx = dx / s;
    let ny = -dy / s;
    let a = nx * nx + ny * ny - 1.0;
    a * a * a - nx * nx * ny * ny * ny <= 0.0
}

// 4-point star polygon: outer spikes at size, inner notches at 30%.
fn star_verts(size: f32) -> [(f32, f32); 8] {
    let mut verts = [(0.0f32, 0.0f32); 8];
    for i in 0..4 {
        let spike = i as f32 * FRAC_PI_2;
        verts[i * 2] = (spike.cos() * size, spike.sin() * size);
        let notch = spike + FRAC_PI_4;
        verts[i * 2 + 1] = (notch.cos() * size * 0.3, notch.sin() * size * 0.3);
    }
    verts
}

fn poly_contains(verts: &[(f32, f32)], px: f32, py: f32) -> bool {
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let (xi, yi) = verts[i];
        let (xj, yj) = verts[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn blend_px(frame: &mut [(f32, f32, f32)], idx: usize, color: (u8, u8, u8), alpha: f32) {
    let px = &mut frame[idx];
    px.0 += (color.0 as f32 - px.0) * alpha;
    px.1 += (color.1 as f32 - px.1) * alpha;
    px.2 += (color.2 as f32 - px.2) * alpha;
}

fn draw_shape<F: Fn(f32, f32) -> bool>(
    frame: &mut [(f32, f32, f32)],
    cols: usize,
    rows: usize,
    p: &AmbientParticle,
    reach: f32,
    contains: F,
) {
    let (sin_r, cos_r) = p.rotation.sin_cos();
    let cx_min = ((p.x - reach) / CELL_PX).floor().max(0.0) as usize;
    let cx_max = ((p.x + reach) / CELL_PX).ceil().min(cols as f32) as usize;
    let cy_min = ((p.y - reach) / CELL_PX).floor().max(0.0) as usize;
    let cy_max = ((p.y + reach) / CELL_PX).ceil().min(rows as f32) as usize;

    for cy in cy_min..cy_max {
        for cx in cx_min..cx_max {
            let dx = (cx as f32 + 0.5) * CELL_PX - p.x;
            let dy = (cy as f32 + 0.5) * CELL_PX - p.y;
            // Rotate the sample point into the particle's frame.
            let rx = dx * cos_r + dy * sin_r;
            let ry = -dx * sin_r + dy * cos_r;
            if contains(rx, ry) {
                blend_px(frame, cy * cols + cx, p.color, p.opacity);
            }
        }
    }
}

fn draw_heart(frame: &mut [(f32, f32, f32)], cols: usize, rows: usize, p: &AmbientParticle, size: f32) {
    draw_shape(frame, cols, rows, p, size, |rx, ry| {
        heart_contains(rx, ry, size)
    });
}

fn draw_sparkle(frame: &mut [(f32, f32, f32)], cols: usize, rows: usize, p: &AmbientParticle, size: f32) {
    let verts = star_verts(size);
    draw_shape(frame, cols, rows, p, size, |rx, ry| {
        poly_contains(&verts, rx, ry)
    });
}

pub struct HeartfieldEffect {
    width: usize,
    height: usize,
    field: Heartfield,
    frame: Vec<(f32, f32, f32)>,
    output_buf: Vec<u8>,
}

impl Effect for HeartfieldEffect {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            field: Heartfield::new(
                width as f32 * CELL_PX,
                height as f32 * CELL_PX,
                fastrand::Rng::new(),
            ),
            frame: vec![(0.0, 0.0, 0.0); width * height],
            output_buf: Vec::with_capacity(width * height * 25),
        }
    }

    fn update(&mut self, dt: f32) {
        self.field.step(dt);
    }

    fn render(&mut self, stdout: &mut BufWriter<Stdout>) -> std::io::Result<()> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        super::fill_background(&mut self.frame, self.width, self.height);
        self.field.paint(&mut self.frame, self.width, self.height);
        super::write_frame(stdout, &self.frame, self.width, self.height, &mut self.output_buf)
    }

    fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.frame = vec![(0.0, 0.0, 0.0); width * height];
        self.field
            .set_viewport(width as f32 * CELL_PX, height as f32 * CELL_PX);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn field() -> Heartfield {
        Heartfield::new(1280.0, 720.0, fastrand::Rng::with_seed(7))
    }

    #[test]
    fn opacity_stays_in_unit_range() {
        let mut field = field();
        for _ in 0..10_000 {
            field.step(DT);
            for p in &field.particles {
                assert!((0.0..=1.0).contains(&p.opacity), "opacity {}", p.opacity);
            }
        }
    }

    #[test]
    fn particle_past_top_margin_wraps_to_bottom_band() {
        let mut field = field();
        field.particles[3].y = -51.0;
        field.step(DT);
        let p = &field.particles[3];
        assert!(p.y > field.height, "recycled below bottom edge, got {}", p.y);
        assert!(p.y <= field.height + WRAP_MARGIN);
        assert!((0.0..=field.width).contains(&p.x));
    }

    #[test]
    fn no_particle_escapes_over_a_long_run() {
        let mut field = field();
        for _ in 0..10_000 {
            field.step(DT);
            for p in &field.particles {
                assert!(p.y >= -WRAP_MARGIN - 1.0 && p.y <= field.height + WRAP_MARGIN);
            }
        }
    }

    #[test]
    fn pool_is_fixed_and_never_reallocates() {
        let mut field = field();
        let cap = field.particles.capacity();
        for _ in 0..10_000 {
            field.step(DT);
        }
        assert_eq!(field.particles.len(), POOL_SIZE);
        assert_eq!(field.particles.capacity(), cap);
    }

    #[test]
    fn colocated_particles_keep_their_own_opacity() {
        // Opacity must be read off the particle, not looked up by position.
        let mut field = field();
        let (x, y) = (200.0, 200.0);
        for i in 0..2 {
            field.particles[i].x = x;
            field.particles[i].y = y;
            field.particles[i].speed_x = 0.0;
            field.particles[i].speed_y = 0.0;
        }
        field.step(DT);
        let a = field.particles[0].opacity;
        let b = field.particles[1].opacity;
        assert!((a - b).abs() > 1e-4, "index phase must separate alphas");
    }

    #[test]
    fn heart_shape_has_lobes_and_tip() {
        // Center, both lobes, and the lower tip are inside; far corners out.
        assert!(heart_contains(0.0, 0.0, 10.0));
        assert!(heart_contains(-3.0, -2.0, 10.0));
        assert!(heart_contains(3.0, -2.0, 10.0));
        assert!(heart_contains(0.0, 4.0, 10.0));
        assert!(!heart_contains(5.0, 5.0, 10.0));
        assert!(!heart_contains(-5.0, 5.0, 10.0));
    }

    #[test]
    fn sparkle_polygon_is_a_four_point_star() {
        let verts = star_verts(10.0);
        // Spikes reach the full radius, notches sit well inside.
        assert!(poly_contains(&verts, 9.0, 0.0));
        assert!(poly_contains(&verts, 0.0, -9.0));
        assert!(!poly_contains(&verts, 6.0, 6.0));
        assert!(poly_contains(&verts, 1.0, 1.0));
    }
}
