// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the smallest unit of the color-threshold classifier. It is a
// "dumb" data container for a single RGB pixel plus the handful of single-pixel
// heuristics needed to tell a lit signal lamp from the street around it. Nothing in
// here looks at neighbors or history.
//
// A lit lamp is bright (high HSV value), vivid (high HSV saturation) and sits in a
// narrow hue band. Those three numbers are all the classifier asks for.

pub mod pixel {
    pub type Channel = u8;
    pub type NormalizedChannel = f32;
    pub type Hue = f32;
    pub type SaturationHSV = f32;
    pub type ValueHSV = f32;
    pub type Chroma = f32;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        red_normalized: NormalizedChannel,
        green_normalized: NormalizedChannel,
        blue_normalized: NormalizedChannel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                red_normalized: red as NormalizedChannel / 255.0f32,
                green_normalized: green as NormalizedChannel / 255.0f32,
                blue_normalized: blue as NormalizedChannel / 255.0f32,
            }
        }

        fn max_channel(&self) -> NormalizedChannel {
            self.red_normalized
                .max(self.green_normalized.max(self.blue_normalized))
        }

        fn min_channel(&self) -> NormalizedChannel {
            self.red_normalized
                .min(self.green_normalized.min(self.blue_normalized))
        }

        /// Hue angle in degrees [0, 360), from normalized sRGB.
        pub fn hue(&self) -> Hue {
            let maximum_channel = self.max_channel();
            let chroma = self.chroma();

            if chroma <= 1e-6 {
                return 0.0;
            }

            let inverse_chroma = 1.0 / chroma;

            let (base_difference, sector_offset) = if maximum_channel == self.red_normalized {
                (self.green_normalized - self.blue_normalized, 0.0)
            } else if maximum_channel == self.green_normalized {
                (self.blue_normalized - self.red_normalized, 2.0)
            } else {
                (self.red_normalized - self.green_normalized, 4.0)
            };

            let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// Chroma (C): max(R,G,B) - min(R,G,B).
        pub fn chroma(&self) -> Chroma {
            self.max_channel() - self.min_channel()
        }

        /// HSV Value (V): the brightest channel.
        pub fn value_hsv(&self) -> ValueHSV {
            self.max_channel()
        }

        /// Saturation (HSV): S = chroma / value. Zero near black.
        pub fn saturation_hsv(&self) -> SaturationHSV {
            let maximum_channel = self.max_channel();
            if maximum_channel <= 1e-6 {
                return 0.0;
            }
            self.chroma() / maximum_channel
        }
    }

    impl From<[Channel; 3]> for Pixel {
        fn from([red, green, blue]: [Channel; 3]) -> Self {
            Pixel::new(red, green, blue)
        }
    }

}

// -----------------------------------------------------------------------------
// Glossary:
//
// - Hue: angle on the color wheel (0°–360°). Red sits at both ends, yellow near 60°,
//   green near 120°.
// - Value (HSV): the maximum channel. A lit lamp is near 1.0.
// - Chroma: max − min channel. Zero for grays.
// - Saturation (HSV): chroma divided by value. Separates a red lamp from a white
//   street light of the same brightness.
