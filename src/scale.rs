//! Scale table and note/voltage math.
//!
//! A note index plus a scale maps to a 1 V/octave control voltage. Scale 0
//! is the chromatic bypass scale; steps flagged `bypass_scale` are evaluated
//! against it regardless of the sequence scale.

use core::fmt::Write;

use heapless::String;
use libm::roundf;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub struct Scale {
    name: &'static str,
    /// Semitone offset of each scale degree within one octave.
    intervals: &'static [u8],
    chromatic: bool,
}

static SCALES: [Scale; 8] = [
    Scale {
        name: "Chromatic",
        intervals: &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        chromatic: true,
    },
    Scale {
        name: "Major",
        intervals: &[0, 2, 4, 5, 7, 9, 11],
        chromatic: false,
    },
    Scale {
        name: "Minor",
        intervals: &[0, 2, 3, 5, 7, 8, 10],
        chromatic: false,
    },
    Scale {
        name: "Major Pent",
        intervals: &[0, 2, 4, 7, 9],
        chromatic: false,
    },
    Scale {
        name: "Minor Pent",
        intervals: &[0, 3, 5, 7, 10],
        chromatic: false,
    },
    Scale {
        name: "Whole Tone",
        intervals: &[0, 2, 4, 6, 8, 10],
        chromatic: false,
    },
    Scale {
        name: "Octave",
        intervals: &[0],
        chromatic: false,
    },
    Scale {
        name: "Octave+5th",
        intervals: &[0, 7],
        chromatic: false,
    },
];

impl Scale {
    pub const COUNT: usize = 8;

    /// Look up a scale by index; out-of-range indices clamp to the table.
    pub fn get(index: i32) -> &'static Scale {
        &SCALES[index.clamp(0, Scale::COUNT as i32 - 1) as usize]
    }

    pub fn name(index: i32) -> &'static str {
        Scale::get(index).name
    }

    pub fn notes_per_octave(&self) -> i32 {
        self.intervals.len() as i32
    }

    pub fn is_chromatic(&self) -> bool {
        self.chromatic
    }

    /// Map a note index to volts, 1 V per octave.
    pub fn note_to_volts(&self, note: i32) -> f32 {
        let notes_per_octave = self.notes_per_octave();
        let octave = note.div_euclid(notes_per_octave);
        let degree = note.rem_euclid(notes_per_octave) as usize;
        octave as f32 + self.intervals[degree] as f32 / 12.0
    }

    /// Inverse of `note_to_volts`: the note index whose voltage is nearest.
    pub fn note_from_volts(&self, volts: f32) -> i32 {
        let semitones = roundf(volts * 12.0) as i32;
        let octave = semitones.div_euclid(12);
        let within = semitones.rem_euclid(12);

        let mut best_degree = 0i32;
        let mut best_distance = i32::MAX;
        for (degree, &interval) in self.intervals.iter().enumerate() {
            let distance = (interval as i32 - within).abs();
            if distance < best_distance {
                best_distance = distance;
                best_degree = degree as i32;
            }
        }

        octave * self.notes_per_octave() + best_degree
    }

    /// Human-readable name of a note index, e.g. `C+1` for the C one octave
    /// up. Non-chromatic scales fall back to degree numbering.
    pub fn format_note(&self, note: i32) -> String<8> {
        let mut out = String::new();
        let notes_per_octave = self.notes_per_octave();
        let octave = note.div_euclid(notes_per_octave);
        let degree = note.rem_euclid(notes_per_octave) as usize;
        if self.chromatic {
            let _ = write!(out, "{}", NOTE_NAMES[self.intervals[degree] as usize % 12]);
        } else {
            let _ = write!(out, "{}", degree + 1);
        }
        if octave != 0 {
            let _ = write!(out, "{:+}", octave);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chromatic_note_to_volts_is_semitones() {
        let scale = Scale::get(0);
        assert!(scale.is_chromatic());
        assert_eq!(12, scale.notes_per_octave());
        assert!((scale.note_to_volts(12) - 1.0).abs() < 1e-6);
        assert!((scale.note_to_volts(-12) + 1.0).abs() < 1e-6);
        assert!((scale.note_to_volts(7) - 7.0 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn major_scale_spans_one_volt_per_octave() {
        let scale = Scale::get(1);
        assert_eq!(7, scale.notes_per_octave());
        assert!((scale.note_to_volts(7) - 1.0).abs() < 1e-6);
        // degree 4 of the major scale is a fifth, 7 semitones
        assert!((scale.note_to_volts(4) - 7.0 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn note_from_volts_inverts_note_to_volts() {
        for index in [0, 1, 2, 6] {
            let scale = Scale::get(index);
            for note in -14..28 {
                let volts = scale.note_to_volts(note);
                assert_eq!(note, scale.note_from_volts(volts));
            }
        }
    }

    #[test]
    fn out_of_range_scale_index_clamps() {
        assert_eq!("Chromatic", Scale::name(-5));
        assert_eq!("Octave+5th", Scale::name(99));
    }

    #[test]
    fn format_note_names_chromatic_notes() {
        let scale = Scale::get(0);
        assert_eq!("C", scale.format_note(0).as_str());
        assert_eq!("G", scale.format_note(7).as_str());
        assert_eq!("C+1", scale.format_note(12).as_str());
        assert_eq!("B-1", scale.format_note(-1).as_str());
    }
}
