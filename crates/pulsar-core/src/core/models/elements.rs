use phf::{Map, phf_map};

/// Tabulated properties of one chemical element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementData {
    pub z: u32,
    pub symbol: &'static str,
    pub name: &'static str,
    /// Standard atomic weight in Dalton.
    pub mass: f64,
    /// Mass number of the most abundant isotope.
    pub common_isotope: u32,
}

pub const MAX_Z: u32 = 86;

static ELEMENTS: [ElementData; 86] = [
    ElementData { z: 1, symbol: "H", name: "Hydrogen", mass: 1.008, common_isotope: 1 },
    ElementData { z: 2, symbol: "He", name: "Helium", mass: 4.002602, common_isotope: 4 },
    ElementData { z: 3, symbol: "Li", name: "Lithium", mass: 6.94, common_isotope: 7 },
    ElementData { z: 4, symbol: "Be", name: "Beryllium", mass: 9.0121831, common_isotope: 9 },
    ElementData { z: 5, symbol: "B", name: "Boron", mass: 10.81, common_isotope: 11 },
    ElementData { z: 6, symbol: "C", name: "Carbon", mass: 12.011, common_isotope: 12 },
    ElementData { z: 7, symbol: "N", name: "Nitrogen", mass: 14.007, common_isotope: 14 },
    ElementData { z: 8, symbol: "O", name: "Oxygen", mass: 15.999, common_isotope: 16 },
    ElementData { z: 9, symbol: "F", name: "Fluorine", mass: 18.998403163, common_isotope: 19 },
    ElementData { z: 10, symbol: "Ne", name: "Neon", mass: 20.1797, common_isotope: 20 },
    ElementData { z: 11, symbol: "Na", name: "Sodium", mass: 22.98976928, common_isotope: 23 },
    ElementData { z: 12, symbol: "Mg", name: "Magnesium", mass: 24.305, common_isotope: 24 },
    ElementData { z: 13, symbol: "Al", name: "Aluminium", mass: 26.9815385, common_isotope: 27 },
    ElementData { z: 14, symbol: "Si", name: "Silicon", mass: 28.085, common_isotope: 28 },
    ElementData { z: 15, symbol: "P", name: "Phosphorus", mass: 30.973761998, common_isotope: 31 },
    ElementData { z: 16, symbol: "S", name: "Sulfur", mass: 32.06, common_isotope: 32 },
    ElementData { z: 17, symbol: "Cl", name: "Chlorine", mass: 35.45, common_isotope: 35 },
    ElementData { z: 18, symbol: "Ar", name: "Argon", mass: 39.948, common_isotope: 40 },
    ElementData { z: 19, symbol: "K", name: "Potassium", mass: 39.0983, common_isotope: 39 },
    ElementData { z: 20, symbol: "Ca", name: "Calcium", mass: 40.078, common_isotope: 40 },
    ElementData { z: 21, symbol: "Sc", name: "Scandium", mass: 44.955908, common_isotope: 45 },
    ElementData { z: 22, symbol: "Ti", name: "Titanium", mass: 47.867, common_isotope: 48 },
    ElementData { z: 23, symbol: "V", name: "Vanadium", mass: 50.9415, common_isotope: 51 },
    ElementData { z: 24, symbol: "Cr", name: "Chromium", mass: 51.9961, common_isotope: 52 },
    ElementData { z: 25, symbol: "Mn", name: "Manganese", mass: 54.938044, common_isotope: 55 },
    ElementData { z: 26, symbol: "Fe", name: "Iron", mass: 55.845, common_isotope: 56 },
    ElementData { z: 27, symbol: "Co", name: "Cobalt", mass: 58.933194, common_isotope: 59 },
    ElementData { z: 28, symbol: "Ni", name: "Nickel", mass: 58.6934, common_isotope: 58 },
    ElementData { z: 29, symbol: "Cu", name: "Copper", mass: 63.546, common_isotope: 63 },
    ElementData { z: 30, symbol: "Zn", name: "Zinc", mass: 65.38, common_isotope: 64 },
    ElementData { z: 31, symbol: "Ga", name: "Gallium", mass: 69.723, common_isotope: 69 },
    ElementData { z: 32, symbol: "Ge", name: "Germanium", mass: 72.630, common_isotope: 74 },
    ElementData { z: 33, symbol: "As", name: "Arsenic", mass: 74.921595, common_isotope: 75 },
    ElementData { z: 34, symbol: "Se", name: "Selenium", mass: 78.971, common_isotope: 80 },
    ElementData { z: 35, symbol: "Br", name: "Bromine", mass: 79.904, common_isotope: 79 },
    ElementData { z: 36, symbol: "Kr", name: "Krypton", mass: 83.798, common_isotope: 84 },
    ElementData { z: 37, symbol: "Rb", name: "Rubidium", mass: 85.4678, common_isotope: 85 },
    ElementData { z: 38, symbol: "Sr", name: "Strontium", mass: 87.62, common_isotope: 88 },
    ElementData { z: 39, symbol: "Y", name: "Yttrium", mass: 88.90584, common_isotope: 89 },
    ElementData { z: 40, symbol: "Zr", name: "Zirconium", mass: 91.224, common_isotope: 90 },
    ElementData { z: 41, symbol: "Nb", name: "Niobium", mass: 92.90637, common_isotope: 93 },
    ElementData { z: 42, symbol: "Mo", name: "Molybdenum", mass: 95.95, common_isotope: 98 },
    ElementData { z: 43, symbol: "Tc", name: "Technetium", mass: 98.0, common_isotope: 98 },
    ElementData { z: 44, symbol: "Ru", name: "Ruthenium", mass: 101.07, common_isotope: 102 },
    ElementData { z: 45, symbol: "Rh", name: "Rhodium", mass: 102.90550, common_isotope: 103 },
    ElementData { z: 46, symbol: "Pd", name: "Palladium", mass: 106.42, common_isotope: 106 },
    ElementData { z: 47, symbol: "Ag", name: "Silver", mass: 107.8682, common_isotope: 107 },
    ElementData { z: 48, symbol: "Cd", name: "Cadmium", mass: 112.414, common_isotope: 114 },
    ElementData { z: 49, symbol: "In", name: "Indium", mass: 114.818, common_isotope: 115 },
    ElementData { z: 50, symbol: "Sn", name: "Tin", mass: 118.710, common_isotope: 120 },
    ElementData { z: 51, symbol: "Sb", name: "Antimony", mass: 121.760, common_isotope: 121 },
    ElementData { z: 52, symbol: "Te", name: "Tellurium", mass: 127.60, common_isotope: 130 },
    ElementData { z: 53, symbol: "I", name: "Iodine", mass: 126.90447, common_isotope: 127 },
    ElementData { z: 54, symbol: "Xe", name: "Xenon", mass: 131.293, common_isotope: 132 },
    ElementData { z: 55, symbol: "Cs", name: "Caesium", mass: 132.90545196, common_isotope: 133 },
    ElementData { z: 56, symbol: "Ba", name: "Barium", mass: 137.327, common_isotope: 138 },
    ElementData { z: 57, symbol: "La", name: "Lanthanum", mass: 138.90547, common_isotope: 139 },
    ElementData { z: 58, symbol: "Ce", name: "Cerium", mass: 140.116, common_isotope: 140 },
    ElementData { z: 59, symbol: "Pr", name: "Praseodymium", mass: 140.90766, common_isotope: 141 },
    ElementData { z: 60, symbol: "Nd", name: "Neodymium", mass: 144.242, common_isotope: 142 },
    ElementData { z: 61, symbol: "Pm", name: "Promethium", mass: 145.0, common_isotope: 145 },
    ElementData { z: 62, symbol: "Sm", name: "Samarium", mass: 150.36, common_isotope: 152 },
    ElementData { z: 63, symbol: "Eu", name: "Europium", mass: 151.964, common_isotope: 153 },
    ElementData { z: 64, symbol: "Gd", name: "Gadolinium", mass: 157.25, common_isotope: 158 },
    ElementData { z: 65, symbol: "Tb", name: "Terbium", mass: 158.92535, common_isotope: 159 },
    ElementData { z: 66, symbol: "Dy", name: "Dysprosium", mass: 162.500, common_isotope: 164 },
    ElementData { z: 67, symbol: "Ho", name: "Holmium", mass: 164.93033, common_isotope: 165 },
    ElementData { z: 68, symbol: "Er", name: "Erbium", mass: 167.259, common_isotope: 166 },
    ElementData { z: 69, symbol: "Tm", name: "Thulium", mass: 168.93422, common_isotope: 169 },
    ElementData { z: 70, symbol: "Yb", name: "Ytterbium", mass: 173.045, common_isotope: 174 },
    ElementData { z: 71, symbol: "Lu", name: "Lutetium", mass: 174.9668, common_isotope: 175 },
    ElementData { z: 72, symbol: "Hf", name: "Hafnium", mass: 178.49, common_isotope: 180 },
    ElementData { z: 73, symbol: "Ta", name: "Tantalum", mass: 180.94788, common_isotope: 181 },
    ElementData { z: 74, symbol: "W", name: "Tungsten", mass: 183.84, common_isotope: 184 },
    ElementData { z: 75, symbol: "Re", name: "Rhenium", mass: 186.207, common_isotope: 187 },
    ElementData { z: 76, symbol: "Os", name: "Osmium", mass: 190.23, common_isotope: 192 },
    ElementData { z: 77, symbol: "Ir", name: "Iridium", mass: 192.217, common_isotope: 193 },
    ElementData { z: 78, symbol: "Pt", name: "Platinum", mass: 195.084, common_isotope: 195 },
    ElementData { z: 79, symbol: "Au", name: "Gold", mass: 196.966569, common_isotope: 197 },
    ElementData { z: 80, symbol: "Hg", name: "Mercury", mass: 200.592, common_isotope: 202 },
    ElementData { z: 81, symbol: "Tl", name: "Thallium", mass: 204.38, common_isotope: 205 },
    ElementData { z: 82, symbol: "Pb", name: "Lead", mass: 207.2, common_isotope: 208 },
    ElementData { z: 83, symbol: "Bi", name: "Bismuth", mass: 208.98040, common_isotope: 209 },
    ElementData { z: 84, symbol: "Po", name: "Polonium", mass: 209.0, common_isotope: 209 },
    ElementData { z: 85, symbol: "At", name: "Astatine", mass: 210.0, common_isotope: 210 },
    ElementData { z: 86, symbol: "Rn", name: "Radon", mass: 222.0, common_isotope: 222 },
];

static SYMBOL_TO_Z: Map<&'static str, u32> = phf_map! {
    "h" => 1,
    "he" => 2,
    "li" => 3,
    "be" => 4,
    "b" => 5,
    "c" => 6,
    "n" => 7,
    "o" => 8,
    "f" => 9,
    "ne" => 10,
    "na" => 11,
    "mg" => 12,
    "al" => 13,
    "si" => 14,
    "p" => 15,
    "s" => 16,
    "cl" => 17,
    "ar" => 18,
    "k" => 19,
    "ca" => 20,
    "sc" => 21,
    "ti" => 22,
    "v" => 23,
    "cr" => 24,
    "mn" => 25,
    "fe" => 26,
    "co" => 27,
    "ni" => 28,
    "cu" => 29,
    "zn" => 30,
    "ga" => 31,
    "ge" => 32,
    "as" => 33,
    "se" => 34,
    "br" => 35,
    "kr" => 36,
    "rb" => 37,
    "sr" => 38,
    "y" => 39,
    "zr" => 40,
    "nb" => 41,
    "mo" => 42,
    "tc" => 43,
    "ru" => 44,
    "rh" => 45,
    "pd" => 46,
    "ag" => 47,
    "cd" => 48,
    "in" => 49,
    "sn" => 50,
    "sb" => 51,
    "te" => 52,
    "i" => 53,
    "xe" => 54,
    "cs" => 55,
    "ba" => 56,
    "la" => 57,
    "ce" => 58,
    "pr" => 59,
    "nd" => 60,
    "pm" => 61,
    "sm" => 62,
    "eu" => 63,
    "gd" => 64,
    "tb" => 65,
    "dy" => 66,
    "ho" => 67,
    "er" => 68,
    "tm" => 69,
    "yb" => 70,
    "lu" => 71,
    "hf" => 72,
    "ta" => 73,
    "w" => 74,
    "re" => 75,
    "os" => 76,
    "ir" => 77,
    "pt" => 78,
    "au" => 79,
    "hg" => 80,
    "tl" => 81,
    "pb" => 82,
    "bi" => 83,
    "po" => 84,
    "at" => 85,
    "rn" => 86,
};

/// Exact isotope masses in Dalton, keyed by lowercase `symbol-massnumber`.
static ISOTOPE_MASSES: Map<&'static str, f64> = phf_map! {
    "h-1" => 1.00782503223,
    "h-2" => 2.01410177812,
    "h-3" => 3.0160492779,
    "he-3" => 3.0160293201,
    "he-4" => 4.00260325413,
    "li-6" => 6.0151228874,
    "li-7" => 7.0160034366,
    "be-9" => 9.012183065,
    "b-10" => 10.01293695,
    "b-11" => 11.00930536,
    "c-12" => 12.0,
    "c-13" => 13.00335483507,
    "c-14" => 14.0032419884,
    "n-14" => 14.00307400443,
    "n-15" => 15.00010889888,
    "o-16" => 15.99491461957,
    "o-17" => 16.99913175650,
    "o-18" => 17.99915961286,
    "f-19" => 18.99840316273,
    "ne-20" => 19.9924401762,
    "ne-22" => 21.991385114,
    "na-23" => 22.9897692820,
    "mg-24" => 23.985041697,
    "al-27" => 26.98153853,
    "si-28" => 27.97692653465,
    "p-31" => 30.97376199842,
    "s-32" => 31.9720711744,
    "s-34" => 33.967867004,
    "cl-35" => 34.968852682,
    "cl-37" => 36.965902602,
    "ar-40" => 39.9623831237,
    "k-39" => 38.9637064864,
    "ca-40" => 39.962590863,
    "fe-56" => 55.93493633,
    "cu-63" => 62.92959772,
    "zn-64" => 63.92914201,
    "br-79" => 78.9183376,
    "br-81" => 80.9162897,
    "i-127" => 126.9044719,
};

pub fn element(z: u32) -> Option<&'static ElementData> {
    if z == 0 {
        return None;
    }
    ELEMENTS.get(z as usize - 1)
}

/// Atomic number for a symbol, ignoring case.
pub fn z_from_symbol(symbol: &str) -> Option<u32> {
    SYMBOL_TO_Z.get(symbol.trim().to_ascii_lowercase().as_str()).copied()
}

pub fn isotope_mass(z: u32, mass_number: u32) -> Option<f64> {
    let data = element(z)?;
    let key = format!("{}-{}", data.symbol.to_ascii_lowercase(), mass_number);
    ISOTOPE_MASSES.get(key.as_str()).copied()
}
