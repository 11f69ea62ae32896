//! Races, classes, and the core attribute block.

pub const ATTR_MIN: i32 = 3;
pub const ATTR_MAX: i32 = 18;
pub const BONUS_POINTS: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Race {
    Human,
    Elf,
    Dwarf,
    Orc,
}

impl Race {
    pub const ALL: [Race; 4] = [Race::Human, Race::Elf, Race::Dwarf, Race::Orc];

    pub fn parse(s: &str) -> Option<Race> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Some(Race::Human),
            "elf" => Some(Race::Elf),
            "dwarf" => Some(Race::Dwarf),
            "orc" => Some(Race::Orc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Race::Human => "Human",
            Race::Elf => "Elf",
            Race::Dwarf => "Dwarf",
            Race::Orc => "Orc",
        }
    }

    /// Baseline attribute block for the race (STR DEX CON INT WIS PRE).
    pub fn base_attributes(self) -> Attributes {
        match self {
            Race::Human => Attributes::new(10, 10, 10, 10, 10, 10),
            Race::Elf => Attributes::new(7, 12, 8, 13, 11, 10),
            Race::Dwarf => Attributes::new(12, 8, 13, 7, 11, 8),
            Race::Orc => Attributes::new(14, 9, 13, 6, 7, 8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Warrior,
    Mage,
    Rogue,
    Cleric,
}

impl Class {
    pub const ALL: [Class; 4] = [Class::Warrior, Class::Mage, Class::Rogue, Class::Cleric];

    pub fn parse(s: &str) -> Option<Class> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warrior" => Some(Class::Warrior),
            "mage" => Some(Class::Mage),
            "rogue" => Some(Class::Rogue),
            "cleric" => Some(Class::Cleric),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Class::Warrior => "Warrior",
            Class::Mage => "Mage",
            Class::Rogue => "Rogue",
            Class::Cleric => "Cleric",
        }
    }

    /// Class-shaped starting pools, from the final attribute block.
    pub fn starting_pools(self, a: &Attributes) -> (i32, i32) {
        match self {
            Class::Warrior => (20 + 2 * a.con, 10 + a.wis),
            Class::Mage => (15 + a.con, 20 + 2 * a.intl),
            Class::Rogue => (18 + (a.con + a.dex) / 2, 15 + a.intl),
            Class::Cleric => (18 + (a.con + a.wis) / 2, 18 + (a.wis + a.intl) / 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Pre,
}

impl Attr {
    pub const ALL: [Attr; 6] = [Attr::Str, Attr::Dex, Attr::Con, Attr::Int, Attr::Wis, Attr::Pre];

    pub fn parse(s: &str) -> Option<Attr> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STR" => Some(Attr::Str),
            "DEX" => Some(Attr::Dex),
            "CON" => Some(Attr::Con),
            "INT" => Some(Attr::Int),
            "WIS" => Some(Attr::Wis),
            "PRE" => Some(Attr::Pre),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Attr::Str => "STR",
            Attr::Dex => "DEX",
            Attr::Con => "CON",
            Attr::Int => "INT",
            Attr::Wis => "WIS",
            Attr::Pre => "PRE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub str_: i32,
    pub dex: i32,
    pub con: i32,
    pub intl: i32,
    pub wis: i32,
    pub pre: i32,
}

impl Attributes {
    pub fn new(str_: i32, dex: i32, con: i32, intl: i32, wis: i32, pre: i32) -> Self {
        Self {
            str_,
            dex,
            con,
            intl,
            wis,
            pre,
        }
    }

    pub fn get(&self, attr: Attr) -> i32 {
        match attr {
            Attr::Str => self.str_,
            Attr::Dex => self.dex,
            Attr::Con => self.con,
            Attr::Int => self.intl,
            Attr::Wis => self.wis,
            Attr::Pre => self.pre,
        }
    }

    /// Raise one attribute by a point. Fails (leaving the block unchanged)
    /// if the raise would leave the 3..=18 band.
    pub fn raise(&mut self, attr: Attr) -> bool {
        let v = self.get(attr);
        if !valid_attr(v + 1) {
            return false;
        }
        match attr {
            Attr::Str => self.str_ += 1,
            Attr::Dex => self.dex += 1,
            Attr::Con => self.con += 1,
            Attr::Int => self.intl += 1,
            Attr::Wis => self.wis += 1,
            Attr::Pre => self.pre += 1,
        }
        true
    }
}

pub fn valid_attr(value: i32) -> bool {
    (ATTR_MIN..=ATTR_MAX).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_and_class_parse_case_insensitively() {
        assert_eq!(Race::parse(" ELF "), Some(Race::Elf));
        assert_eq!(Race::parse("gnome"), None);
        assert_eq!(Class::parse("Mage"), Some(Class::Mage));
        assert_eq!(Class::parse("bard"), None);
    }

    #[test]
    fn raise_refuses_past_eighteen() {
        let mut a = Attributes::new(18, 10, 10, 10, 10, 10);
        assert!(!a.raise(Attr::Str));
        assert_eq!(a.str_, 18);
        assert!(a.raise(Attr::Dex));
        assert_eq!(a.dex, 11);
    }

    #[test]
    fn bonus_allocation_cannot_exceed_cap() {
        // Pour every bonus point at one attribute; it stops at 18.
        let mut a = Race::Orc.base_attributes(); // STR 14
        let mut spent = 0;
        for _ in 0..BONUS_POINTS {
            if a.raise(Attr::Str) {
                spent += 1;
            }
        }
        assert_eq!(a.str_, 18);
        assert_eq!(spent, 4);
    }

    #[test]
    fn elf_mage_pools_match_the_book() {
        let a = Race::Elf.base_attributes();
        let (hp, mp) = Class::Mage.starting_pools(&a);
        assert_eq!(hp, 23); // 15 + CON(8)
        assert_eq!(mp, 46); // 20 + 2*INT(13)
    }

    #[test]
    fn warrior_pools_scale_with_con() {
        let a = Race::Dwarf.base_attributes();
        let (hp, mp) = Class::Warrior.starting_pools(&a);
        assert_eq!(hp, 20 + 2 * 13);
        assert_eq!(mp, 10 + 11);
    }
}
