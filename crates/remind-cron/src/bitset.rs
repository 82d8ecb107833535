//! Fixed-width bit vectors backing the cron field masks.
//!
//! Each calendar field value `i` is permitted iff bit `i` is set. The masks
//! are plain `Copy` values — a parse builds them once and they are never
//! mutated afterwards.

macro_rules! bitset {
    ($name:ident, $repr:ty, $bits:expr) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(pub $repr);

        impl $name {
            /// Number of addressable bits.
            pub const LEN: u32 = $bits;

            /// Empty mask: no value permitted.
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Mask with bits `[0, count)` set.
            pub const fn first(count: u32) -> Self {
                if count >= Self::LEN {
                    Self(<$repr>::MAX)
                } else {
                    Self((1 as $repr << count) - 1)
                }
            }

            pub const fn get(self, index: u32) -> bool {
                index < Self::LEN && self.0 & (1 as $repr) << index != 0
            }

            pub const fn set(self, index: u32, value: bool) -> Self {
                if index >= Self::LEN {
                    self
                } else if value {
                    Self(self.0 | (1 as $repr) << index)
                } else {
                    Self(self.0 & !((1 as $repr) << index))
                }
            }

            /// Sub-mask keeping only bits `[start, start + count)`.
            pub const fn slice(self, start: u32, count: u32) -> Self {
                let head = Self::first(start).0;
                let whole = if start + count >= Self::LEN {
                    <$repr>::MAX
                } else {
                    (1 as $repr << (start + count)) - 1
                };
                Self(self.0 & whole & !head)
            }

            /// First set bit at or after `index`, or `limit` when the mask is
            /// exhausted in `[index, limit)` — the caller carries into the
            /// next higher unit.
            pub const fn first_set_at_or_after(self, index: u32, limit: u32) -> u32 {
                let mut i = index;
                while i < limit && !self.get(i) {
                    i += 1;
                }
                i
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }
    };
}

bitset!(BitSet8, u8, 8);
bitset!(BitSet16, u16, 16);
bitset!(BitSet32, u32, 32);
bitset!(BitSet64, u64, 64);
