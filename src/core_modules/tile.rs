// THEORY:
// The `Tile` module represents one rectangular cell of the fixed grid partition
// of an image. It is the unit of analysis for the whole engine: preprocessing
// produces canonical images, the tiler slices them into `Tile`s, and every
// later stage (differencing, relevance gating, classification) consumes tiles.
//
// Key architectural principles:
// 1.  **Structured Grid Identity**: A tile carries its own (col, row) position.
//     Earlier designs encoded grid position only in generated filenames and
//     re-derived it with index arithmetic at every consumer; carrying the
//     position as data eliminates that whole class of off-by-one bugs.
// 2.  **Data Container**: Like the rest of the "dumb" data layer, a `Tile`
//     holds its flattened luma buffer and knows how to perform summary
//     calculations on its own data. It does not know how to compare itself
//     to other tiles — that is the differencer's job.
// 3.  **Noise-Tolerant Summary**: The core summary operation is
//     `mean_intensity`, which averages out single-pixel sensor noise and is
//     the signal the relevance filter gates on.

pub mod tile {
    use image::GrayImage;

    /// A "dumb" data container representing a rectangular block of grayscale
    /// pixels at a fixed position in the image grid.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Tile {
        /// The column index of this tile in the grid (zero-based).
        pub col: u32,
        /// The row index of this tile in the grid (zero-based).
        pub row: u32,
        /// The width of the tile in pixels.
        pub width: u32,
        /// The height of the tile in pixels.
        pub height: u32,
        /// A flattened, row-major vector of the luma values within this tile.
        pub pixels: Vec<u8>,
    }

    impl Tile {
        pub fn new(col: u32, row: u32, width: u32, height: u32, pixels: Vec<u8>) -> Self {
            debug_assert_eq!(pixels.len(), (width * height) as usize);
            Self {
                col,
                row,
                width,
                height,
                pixels,
            }
        }

        /// The row-major index of this tile in a grid with `columns` columns.
        pub fn index(&self, columns: u32) -> usize {
            (self.row * columns + self.col) as usize
        }

        /// Calculates the average luma value for the entire tile.
        /// This is the core operation for summarizing the tile's state.
        pub fn mean_intensity(&self) -> f64 {
            let num_pixels = self.pixels.len();
            if num_pixels == 0 {
                return 0.0;
            }

            // Process in chunks for better cache locality and vectorization.
            const CHUNK_SIZE: usize = 64;
            let mut sum = 0u64;
            for chunk in self.pixels.chunks(CHUNK_SIZE) {
                for value in chunk {
                    sum += *value as u64;
                }
            }

            sum as f64 / num_pixels as f64
        }

        /// Re-materializes the tile as a standalone grayscale image, e.g. for
        /// saving it as an artifact.
        pub fn to_image(&self) -> GrayImage {
            GrayImage::from_raw(self.width, self.height, self.pixels.clone())
                .expect("tile buffer length matches its dimensions")
        }
    }
}
