//! The fixed Lotería card catalog.

use loteria_protocol::Card;

/// Cards in the catalog, and therefore in every deck.
pub const DECK_SIZE: usize = 28;

/// Cards on every player's board (a 4×4 grid).
pub const BOARD_SIZE: usize = 16;

/// Every card in the game, ids `1..=28`.
pub static CATALOG: [Card; DECK_SIZE] = [
    Card::new(1, "El Callejón del Beso"),
    Card::new(2, "Las Momias"),
    Card::new(3, "Teatro Juárez"),
    Card::new(4, "Cerro de la Bufa"),
    Card::new(5, "Mina El Edén"),
    Card::new(6, "Sótano de las Golondrinas"),
    Card::new(7, "Jardín Surrealista"),
    Card::new(8, "Feria de San Marcos"),
    Card::new(9, "La Catrina"),
    Card::new(10, "Enchiladas Mineras"),
    Card::new(11, "Asado de Boda"),
    Card::new(12, "Caja de Agua"),
    Card::new(13, "Deshilado"),
    Card::new(14, "Alhóndiga de Granaditas"),
    Card::new(15, "Teleférico"),
    Card::new(16, "Real de Catorce"),
    Card::new(17, "Cerro del Muerto"),
    Card::new(18, "Cristo Rey"),
    Card::new(19, "La Quemada"),
    Card::new(20, "Cascada de Tamul"),
    Card::new(21, "El Pípila"),
    Card::new(22, "La Universidad"),
    Card::new(23, "La Catedral"),
    Card::new(24, "Las Morismas de Bracho"),
    Card::new(25, "El Rebozo"),
    Card::new(26, "El Parque Tangamanga"),
    Card::new(27, "El Ferrocarril"),
    Card::new(28, "El Cristo Roto"),
];

/// Looks up a catalog card by id.
pub fn card_by_id(id: u8) -> Option<&'static Card> {
    CATALOG.iter().find(|c| c.id == id)
}
