/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    ZXTAPE-DECK is free software: you can redistribute it and/or modify
    it under the terms of the GNU Lesser General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    ZXTAPE-DECK is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
/*! **ZXTAPE-DECK** emulates the cassette-tape deck of a ZX Spectrum.

It reads **TZX** and **TAP** tape containers, analyzes them into logical
sections for listing and track display, and reproduces the original pulse
train with microsecond timing through a bounded lock-free queue feeding a
fixed-rate audio or GPIO output.

The moving parts:

* [storage]: the [TapeStorage] backends a tape is read from.
* [info]: the container analyzer producing a [TapeInfo].
* [decoder]: the [BlockDecoder] contract of the external pulse driver.
* [carousel]: the [PulseRing] carrying pulse runs between threads.
* [pacer]: the adaptive feedback pacing the decode timer.
* [render]: the [PulseRenderer] consuming the ring in the audio callback.
* [producer]: the decode-context thread.
* [deck]: the [TapeDeck] controller tying it all together.
* [host]: optional native audio output (the `cpal` feature).

```no_run
use zxtape_deck::{TapeDeck, TapeDeckConfig};
# struct MyDecoder;
# impl zxtape_deck::BlockDecoder for MyDecoder {
#     fn start(&mut self) {}
#     fn stop(&mut self) {}
#     fn set_paused(&mut self, _: bool) {}
#     fn service(&mut self) {}
#     fn next_pulse(&mut self, _: &zxtape_deck::PinLevel) -> u32 { zxtape_deck::PERIOD_EOF }
# }
# fn make_decoder(_storage: zxtape_deck::SharedStorage) -> MyDecoder { MyDecoder }

let mut deck = TapeDeck::create(TapeDeckConfig::default(),
                                |storage| Box::new(make_decoder(storage)));
let mut renderer = deck.renderer::<f32>();
deck.load_file("manic_miner.tzx")?;
deck.play_pause();
loop {
    deck.run();
    # break;
    // ... hand `renderer` buffers to the audio backend, sleep a little
}
# Ok::<(), std::io::Error>(())
```

Optional cargo features:

* `cpal`: stream through a system audio device, see [host::cpal].
* `serde`: serialization of the analysis result types.
*/
pub mod carousel;
pub mod deck;
pub mod decoder;
pub mod host;
pub mod info;
pub mod pacer;
pub mod producer;
pub mod render;
pub mod storage;
pub mod timer;
pub mod tzx;

pub use carousel::{PulseRing, PulseRun};
pub use deck::{TapeDeck, TapeDeckConfig, TapeDeckStatus, TapeSession};
pub use decoder::{BlockDecoder, PinLevel, SharedDecoder, PERIOD_EOF};
pub use info::{analyze, Block, Section, SectionFlags, TapeInfo, TapeKind};
pub use pacer::{AdaptivePacer, Pace, PacerConfig};
pub use render::{AudioSample, PulseRenderer};
pub use storage::{BufferStorage, FileStorage, NullStorage, SharedStorage, TapeStorage};
pub use timer::OneShot;
pub use tzx::TzxId;
