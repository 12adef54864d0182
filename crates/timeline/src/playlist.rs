use serde::{Deserialize, Serialize};

use crate::{millis_to_secs, Clip, ClipId, Millis, TimelineError};

/// A clip placed on the virtual timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub clip: Clip,
    pub offset_millis: Millis,
}

impl TimelineEntry {
    pub fn offset_secs(&self) -> f64 {
        millis_to_secs(self.offset_millis)
    }

    pub fn end_millis(&self) -> Millis {
        self.offset_millis + self.clip.duration_millis()
    }
}

/// Result of mapping a global position onto the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub index: usize,
    /// Offset inside the clip, not counting its trim point.
    pub local_secs: f64,
    /// The position is the terminal boundary of the last clip.
    pub at_end: bool,
}

/// Virtual concatenation of an ordered list of clips.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    total_millis: Millis,
}

impl Timeline {
    pub fn build(clips: &[Clip]) -> Result<Self, TimelineError> {
        if clips.is_empty() {
            return Err(TimelineError::Empty);
        }

        let mut entries = Vec::with_capacity(clips.len());
        let mut offset = 0;
        for (index, clip) in clips.iter().enumerate() {
            clip.validate(index)?;
            entries.push(TimelineEntry {
                clip: clip.clone(),
                offset_millis: offset,
            });
            offset += clip.duration_millis();
        }

        Ok(Self {
            entries,
            total_millis: offset,
        })
    }

    pub fn total_millis(&self) -> Millis {
        self.total_millis
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&TimelineEntry> {
        self.entries.get(index)
    }

    pub fn clips(&self) -> Vec<Clip> {
        self.entries.iter().map(|e| e.clip.clone()).collect()
    }

    pub fn locate(&self, position: Millis) -> Result<Location, TimelineError> {
        if position < 0 || position > self.total_millis {
            return Err(TimelineError::OutOfRange {
                position,
                total: self.total_millis,
            });
        }

        if position == self.total_millis {
            let index = self.entries.len() - 1;
            return Ok(Location {
                index,
                local_secs: self.entries[index].clip.duration_secs,
                at_end: true,
            });
        }

        // First entry whose end lies beyond the position.
        let index = self.entries.partition_point(|e| e.end_millis() <= position);
        let entry = &self.entries[index];
        Ok(Location {
            index,
            local_secs: millis_to_secs(position - entry.offset_millis),
            at_end: false,
        })
    }

    /// Clip id and absolute in-file offset (seconds) for a global position.
    pub fn id_and_offset(&self, position: Millis) -> Result<(ClipId, f64), TimelineError> {
        let location = self.locate(position)?;
        let clip = &self.entries[location.index].clip;
        Ok((clip.id.clone(), location.local_secs + clip.start_offset_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist() -> Vec<Clip> {
        vec![
            Clip::new("A", 10.0),
            Clip::new("B", 8.0).with_start_offset(2.0),
            Clip::new("C", 4.5),
        ]
    }

    #[test]
    fn test_build_offsets() {
        let timeline = Timeline::build(&playlist()).unwrap();
        let offsets: Vec<Millis> = timeline.entries().iter().map(|e| e.offset_millis).collect();
        assert_eq!(offsets, vec![0, 10_000, 18_000]);
        assert_eq!(timeline.total_millis(), 22_500);

        let last = timeline.entries().last().unwrap();
        assert_eq!(last.end_millis(), timeline.total_millis());
    }

    #[test]
    fn test_build_rejects_bad_input() {
        assert_eq!(Timeline::build(&[]), Err(TimelineError::Empty));

        let clips = vec![Clip::new("A", 3.0), Clip::new("B", 0.0)];
        match Timeline::build(&clips) {
            Err(TimelineError::InvalidClip { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected invalid clip, got {:?}", other),
        }
    }

    #[test]
    fn test_locate_inside_clips() {
        let timeline = Timeline::build(&playlist()).unwrap();

        let loc = timeline.locate(0).unwrap();
        assert_eq!((loc.index, loc.local_secs, loc.at_end), (0, 0.0, false));

        let loc = timeline.locate(9_999).unwrap();
        assert_eq!(loc.index, 0);
        assert!((loc.local_secs - 9.999).abs() < 1e-9);

        // A clip boundary belongs to the following clip.
        let loc = timeline.locate(10_000).unwrap();
        assert_eq!((loc.index, loc.local_secs), (1, 0.0));

        let loc = timeline.locate(20_250).unwrap();
        assert_eq!(loc.index, 2);
        assert!((loc.local_secs - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_locate_terminal_boundary() {
        let timeline = Timeline::build(&playlist()).unwrap();
        let loc = timeline.locate(timeline.total_millis()).unwrap();
        assert_eq!(loc.index, timeline.len() - 1);
        assert!(loc.at_end);
        assert_eq!(loc.local_secs, 4.5);
    }

    #[test]
    fn test_locate_out_of_range() {
        let timeline = Timeline::build(&playlist()).unwrap();
        assert_eq!(
            timeline.locate(-1),
            Err(TimelineError::OutOfRange {
                position: -1,
                total: 22_500
            })
        );
        assert!(timeline.locate(22_501).is_err());
    }

    #[test]
    fn test_terminal_boundary_for_many_shapes() {
        let shapes: &[&[f64]] = &[&[1.0], &[0.3, 0.3, 0.4], &[10.0, 8.0], &[0.001, 59.999, 7.25]];
        for durations in shapes {
            let clips: Vec<Clip> = durations
                .iter()
                .enumerate()
                .map(|(i, d)| Clip::new(format!("clip-{i}"), *d))
                .collect();
            let timeline = Timeline::build(&clips).unwrap();
            let loc = timeline.locate(timeline.total_millis()).unwrap();
            assert_eq!(loc.index, clips.len() - 1);
            assert!(loc.at_end);
        }
    }

    #[test]
    fn test_id_and_offset_includes_trim() {
        let timeline = Timeline::build(&playlist()).unwrap();
        let (id, offset) = timeline.id_and_offset(12_500).unwrap();
        assert_eq!(id.as_str(), "B");
        assert!((offset - 4.5).abs() < 1e-9);

        let (id, offset) = timeline.id_and_offset(3_000).unwrap();
        assert_eq!(id.as_str(), "A");
        assert!((offset - 3.0).abs() < 1e-9);
    }
}
