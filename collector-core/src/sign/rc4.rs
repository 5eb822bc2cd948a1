/// RC4 keystream generator.
pub struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (index, slot) in state.iter_mut().enumerate() {
            *slot = index as u8;
        }
        if !key.is_empty() {
            let mut j: u8 = 0;
            for index in 0..256 {
                j = j
                    .wrapping_add(state[index])
                    .wrapping_add(key[index % key.len()]);
                state.swap(index, j as usize);
            }
        }
        Self { state, i: 0, j: 0 }
    }

    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let index = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
            *byte ^= self.state[index as usize];
        }
    }

    pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let mut buffer = plaintext.to_vec();
        Rc4::new(key).apply_keystream(&mut buffer);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_published_vector() {
        let cipher = Rc4::encrypt(b"Key", b"Plaintext");
        assert_eq!(hex::encode(cipher), "bbf316e8d940af0ad3");
    }

    #[test]
    fn decrypts_with_same_key() {
        let cipher = Rc4::encrypt(b"xhswebmplfbt", b"{\"x33\":\"0\"}");
        assert_eq!(Rc4::encrypt(b"xhswebmplfbt", &cipher), b"{\"x33\":\"0\"}");
    }
}
