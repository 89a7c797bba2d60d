use crate::{
    control::VisualizationFlags,
    types::{Frame, HolisticFrame, LandmarkStream},
};

pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

#[derive(Clone, Copy, Debug)]
struct Style {
    line: [u8; 4],
    point: [u8; 4],
    thickness: i32,
    radius: i32,
}

const POSE_STYLE: Style = Style {
    line: [250, 204, 21, 255],
    point: [234, 88, 12, 255],
    thickness: 3,
    radius: 4,
};

const LEFT_HAND_STYLE: Style = Style {
    line: [56, 189, 248, 255],
    point: [248, 113, 113, 255],
    thickness: 3,
    radius: 3,
};

const RIGHT_HAND_STYLE: Style = Style {
    line: [52, 211, 153, 255],
    point: [244, 114, 182, 255],
    thickness: 3,
    radius: 3,
};

const FACE_STYLE: Style = Style {
    line: [0, 0, 0, 0],
    point: [226, 232, 240, 255],
    thickness: 1,
    radius: 1,
};

/// Draws the enabled parts of `landmarks` onto the frame using their normalised
/// image coordinates.
pub fn draw_landmarks(frame: &mut Frame, landmarks: &HolisticFrame, flags: VisualizationFlags) {
    let (width, height) = (frame.width, frame.height);
    let buffer = frame.rgba.as_mut_slice();

    if flags.face {
        if let Some(face) = &landmarks.face.landmarks {
            draw_skeleton(buffer, width, height, face, &[], FACE_STYLE);
        }
    }
    if flags.pose {
        if let Some(pose) = &landmarks.pose.local {
            draw_skeleton(buffer, width, height, pose, POSE_CONNECTIONS, POSE_STYLE);
        }
    }
    if flags.hands {
        if let Some(left) = &landmarks.hands.left.local {
            draw_skeleton(buffer, width, height, left, HAND_CONNECTIONS, LEFT_HAND_STYLE);
        }
        if let Some(right) = &landmarks.hands.right.local {
            draw_skeleton(buffer, width, height, right, HAND_CONNECTIONS, RIGHT_HAND_STYLE);
        }
    }
}

/// Pixel positions, `None` for landmarks that are not finite or lie more than
/// one frame size outside the image. Keeps line walks bounded.
fn to_pixels(stream: &LandmarkStream, width: u32, height: u32) -> Vec<Option<(i32, i32)>> {
    let (w, h) = (width as f32, height as f32);
    stream
        .iter()
        .map(|lm| {
            let (x, y) = (lm.x * w, lm.y * h);
            let visible = x.is_finite()
                && y.is_finite()
                && (-w..=2.0 * w).contains(&x)
                && (-h..=2.0 * h).contains(&y);
            visible.then_some((x as i32, y as i32))
        })
        .collect()
}

fn draw_skeleton(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    stream: &LandmarkStream,
    connections: &[(usize, usize)],
    style: Style,
) {
    let points = to_pixels(stream, width, height);
    for &(a, b) in connections {
        if let (Some(Some(pa)), Some(Some(pb))) = (points.get(a), points.get(b)) {
            draw_line(buffer, width, height, *pa, *pb, style.line, style.thickness);
        }
    }
    for &point in points.iter().flatten() {
        draw_circle(buffer, width, height, point, style.radius, style.point);
    }
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (i32, i32),
    p1: (i32, i32),
    color: [u8; 4],
    thickness: i32,
) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        if radius > 0 {
            draw_circle(buffer, width, height, (x0, y0), radius, color);
        } else {
            put_pixel_safe(buffer, width, height, x0, y0, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = (uy as usize * width as usize + ux as usize) * 4;
    if let Some(px) = buffer.get_mut(idx..idx + 4) {
        px.copy_from_slice(&color);
    }
}
