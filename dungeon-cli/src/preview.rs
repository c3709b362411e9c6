use dungeon_core::{Cell, Direction, Dungeon};

use svg::{
    Document,
    node::element::{Path, Rectangle, path::Data},
};

const CELL_SIZE: u32 = 16;
const MAP_MARGIN: u32 = 32;
const STROKE_WIDTH: u32 = 2;
// Door marks cover the middle of an edge, leaving this much wall on each end
const DOOR_INSET: u32 = 4;

const BACKGROUND: &str = "#101018";
const WALL_COLOR: &str = "#f8f8f8";
const DOOR_COLOR: &str = "#f80000";

/// Draws every claimed cell in its floor colour, with walls as white strokes
/// and doors as red marks across the wall line.
pub fn render_svg(dungeon: &Dungeon) -> Document {
    let canvas_width = dungeon.width() * CELL_SIZE + MAP_MARGIN;
    let canvas_height = dungeon.height() * CELL_SIZE + MAP_MARGIN;

    let mut document = Document::new()
        .set("width", canvas_width)
        .set("height", canvas_height)
        .set("viewBox", (0, 0, canvas_width, canvas_height))
        .add(
            Rectangle::new()
                .set("width", canvas_width)
                .set("height", canvas_height)
                .set("fill", BACKGROUND),
        );

    for cell in dungeon.grid().iter().filter(|cell| !cell.is_unclaimed()) {
        let (x, y) = cell_origin(cell);

        document = document.add(
            Rectangle::new()
                .set("x", x)
                .set("y", y)
                .set("width", CELL_SIZE)
                .set("height", CELL_SIZE)
                .set("fill", format!("#{:06x}", cell.floor_color())),
        );
    }

    let mut walls = Data::new();
    let mut doors = Data::new();

    for cell in dungeon.grid().iter().filter(|cell| !cell.is_unclaimed()) {
        for direction in cell.walls().iter() {
            if cell.doors().contains(direction) {
                continue;
            }

            let (from, to) = edge_segment(cell, direction, 0);
            walls = walls.move_to(from).line_to(to);
        }

        // A door is stored on both of its cells, draw it once
        for direction in cell.doors().iter() {
            if matches!(direction, Direction::East | Direction::South) {
                let (from, to) = edge_segment(cell, direction, DOOR_INSET);
                doors = doors.move_to(from).line_to(to);
            }
        }
    }

    document
        .add(
            Path::new()
                .set("fill", "none")
                .set("stroke", WALL_COLOR)
                .set("stroke-width", STROKE_WIDTH)
                .set("stroke-linecap", "square")
                .set("d", walls),
        )
        .add(
            Path::new()
                .set("fill", "none")
                .set("stroke", DOOR_COLOR)
                .set("stroke-width", STROKE_WIDTH * 2)
                .set("d", doors),
        )
}

fn cell_origin(cell: &Cell) -> (u32, u32) {
    let coord = cell.coord();
    (
        coord.col * CELL_SIZE + MAP_MARGIN / 2,
        coord.row * CELL_SIZE + MAP_MARGIN / 2,
    )
}

fn edge_segment(cell: &Cell, direction: Direction, inset: u32) -> ((u32, u32), (u32, u32)) {
    let (x, y) = cell_origin(cell);
    let (near, far) = (inset, CELL_SIZE - inset);

    match direction {
        Direction::North => ((x + near, y), (x + far, y)),
        Direction::South => ((x + near, y + CELL_SIZE), (x + far, y + CELL_SIZE)),
        Direction::West => ((x, y + near), (x, y + far)),
        Direction::East => ((x + CELL_SIZE, y + near), (x + CELL_SIZE, y + far)),
    }
}

/// One character per cell: `#` rock, `.` corridor, `+` a room cell with a
/// door, and a letter per room otherwise.
pub fn render_ascii(dungeon: &Dungeon) -> String {
    let mut output = String::with_capacity(((dungeon.width() + 1) * dungeon.height()) as usize);

    for (idx, cell) in dungeon.grid().iter().enumerate() {
        let symbol = match cell.room() {
            None => '#',
            Some(_) if cell.is_corridor() => '.',
            Some(_) if !cell.doors().is_empty() => '+',
            Some(room_id) => (b'a' + (room_id % 26) as u8) as char,
        };
        output.push(symbol);

        if (idx as u32 + 1) % dungeon.width() == 0 {
            output.push('\n');
        }
    }

    output
}

#[cfg(test)]
mod test {
    use super::*;

    use dungeon_core::GeneratorConfig;

    fn small_dungeon() -> Dungeon {
        let config = GeneratorConfig::default().with_size(24, 20).with_seed(3);
        dungeon_core::create_dungeon(&config).unwrap()
    }

    #[test]
    fn test_ascii_has_one_line_per_row() {
        let dungeon = small_dungeon();
        let ascii = render_ascii(&dungeon);

        let lines = ascii.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 20);
        assert!(lines.iter().all(|line| line.chars().count() == 24));
        // The border keep-out is never claimed
        assert!(lines[0].chars().all(|symbol| symbol == '#'));
    }

    #[test]
    fn test_svg_paints_claimed_cells() {
        let dungeon = small_dungeon();
        let rendered = render_svg(&dungeon).to_string();

        let claimed = dungeon
            .grid()
            .iter()
            .filter(|cell| !cell.is_unclaimed())
            .count();

        // One background rectangle plus one per claimed cell
        assert_eq!(rendered.matches("<rect").count(), claimed + 1);
        assert!(rendered.contains(WALL_COLOR));
    }
}
